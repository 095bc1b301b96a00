//! Links standard-library modules and a user program into one address space.
//!
//! Stdlib modules are assembled in the order their [`StdlibSource`] lists them.
//! Each module's code labels move up by the instructions accumulated before it,
//! and resolved label operands inside the module move with them. User code goes
//! last and is rebased by [`LinkedProgram::user_code_start`]. Pending label
//! operands are then resolved against the merged table; a name that is still
//! unknown fails the link.
//!
//! Instruction `address` fields keep their module-local values; only operands
//! are rewritten.
//!
//! The linked data section holds the user data first, then each stdlib
//! module's data in link order. Stdlib operands that point into their module's
//! data are recorded when the cache is built and patched at link time, once the
//! user program's size is known.
//!
//! The assembled stdlib is kept in a [`StdlibCache`] owned by the [`Linker`]
//! until [`Linker::invalidate`] or [`Linker::link_with_reload`] drops it.

use crate::assembly::assembler::{assemble, resolve_operands};
use crate::assembly::errors::AsmError;
use crate::assembly::operand::{LabelRef, OperandValue};
use crate::assembly::program::{Assembly, DataByte, Instruction, LabelTable};
use crate::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension of stdlib modules on disk.
pub const STDLIB_EXTENSION: &str = "asm";

/// Label that [`LinkedProgram::into_assembly`] puts on the first user
/// instruction, so loaders of a linked program can find where to start.
pub const ENTRY_LABEL: &str = "romasm_entry";

/// Name used for the user module in errors.
const USER_MODULE: &str = "<user>";
/// Owner of labels the linker defines itself.
const LINKER: &str = "<linker>";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module {module} has {} assembly error(s)", .errors.len())]
    Assembly {
        module: String,
        errors: Vec<AsmError>,
    },
    #[error("unresolved call to '{name}' in {module} (instruction {address})")]
    UnresolvedCall {
        name: String,
        module: String,
        address: u32,
    },
    #[error("required function '{0}' is not defined")]
    MissingFunction(String),
    #[error("symbol '{name}' is defined in both {first} and {second}")]
    DuplicateSymbol {
        name: String,
        first: String,
        second: String,
    },
}

/// Source text of one stdlib module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdlibModule {
    pub name: String,
    pub source: String,
}

/// Supplies stdlib modules in a fixed link order.
pub trait StdlibSource {
    fn modules(&self) -> Result<Vec<StdlibModule>, LinkError>;
}

/// Stdlib held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStdlib {
    modules: Vec<StdlibModule>,
}

impl InMemoryStdlib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: &str, source: &str) -> Self {
        self.set_module(name, source);
        self
    }

    /// Adds a module at the end, or replaces the source of an existing one in place.
    pub fn set_module(&mut self, name: &str, source: &str) {
        match self.modules.iter_mut().find(|m| m.name == name) {
            Some(module) => module.source = source.to_string(),
            None => self.modules.push(StdlibModule {
                name: name.to_string(),
                source: source.to_string(),
            }),
        }
    }
}

impl StdlibSource for InMemoryStdlib {
    fn modules(&self) -> Result<Vec<StdlibModule>, LinkError> {
        Ok(self.modules.clone())
    }
}

/// Stdlib read from `<dir>/<module>.asm` files on every (re)load.
#[derive(Debug, Clone)]
pub struct DirectoryStdlib {
    dir: PathBuf,
    modules: Vec<String>,
}

impl DirectoryStdlib {
    /// Uses the given module names, in order.
    pub fn new(dir: impl Into<PathBuf>, modules: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            modules,
        }
    }

    /// Uses every `.asm` file in `dir`, ordered by name.
    pub fn scan(dir: impl Into<PathBuf>) -> Result<Self, LinkError> {
        let dir = dir.into();
        let io_err = |source| LinkError::Io {
            path: dir.clone(),
            source,
        };
        let mut modules = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(STDLIB_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                modules.push(stem.to_string());
            }
        }
        modules.sort();
        Ok(Self::new(dir, modules))
    }

    pub fn module_names(&self) -> &[String] {
        &self.modules
    }

    fn module_path(&self, name: &str) -> PathBuf {
        self.dir.join(Path::new(name).with_extension(STDLIB_EXTENSION))
    }
}

impl StdlibSource for DirectoryStdlib {
    fn modules(&self) -> Result<Vec<StdlibModule>, LinkError> {
        self.modules
            .iter()
            .map(|name| {
                let path = self.module_path(name);
                let source = fs::read_to_string(&path).map_err(|source| LinkError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(StdlibModule {
                    name: name.clone(),
                    source,
                })
            })
            .collect()
    }
}

/// Placement of one module in the linked stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpan {
    pub name: String,
    pub base: u32,
    pub len: u32,
}

/// A stdlib operand that refers to stdlib data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DataFixup {
    instruction: usize,
    operand: usize,
    /// Offset within the stdlib data.
    offset: u32,
}

/// The assembled, rebased stdlib.
#[derive(Debug, Clone, Default)]
pub struct StdlibCache {
    instructions: Vec<Instruction>,
    labels: LabelTable,
    data: Vec<DataByte>,
    /// Stdlib data labels, relative to the start of the stdlib data.
    data_labels: LabelTable,
    fixups: Vec<DataFixup>,
    /// Module that defined each label.
    owners: BTreeMap<String, String>,
    modules: Vec<ModuleSpan>,
}

/// Moves resolved label operands by `base`.
///
/// User data sits right after all linked code, so user code and data labels
/// shift by the same amount.
fn rebase(instr: &mut Instruction, base: u32) {
    for op in &mut instr.operands {
        if let OperandValue::Label(LabelRef::Resolved(addr)) = &mut op.value {
            *addr += base;
        }
    }
}

/// Length of a data section, counting gaps.
fn data_len(data: &[DataByte]) -> u32 {
    data.iter().map(|b| b.address + 1).max().unwrap_or(0)
}

/// Resolves pending operands against `labels`, failing on the first unknown name.
fn resolve_or_fail(instr: &mut Instruction, labels: &LabelTable, module: &str) -> Result<(), LinkError> {
    resolve_operands(instr, labels);
    match instr.operands.iter().find_map(|op| op.pending_name()) {
        Some(name) => Err(LinkError::UnresolvedCall {
            name: name.to_string(),
            module: module.to_string(),
            address: instr.address,
        }),
        None => Ok(()),
    }
}

impl StdlibCache {
    /// Assembles and rebases every module from `source`.
    pub fn build(source: &impl StdlibSource) -> Result<Self, LinkError> {
        let mut cache = StdlibCache::default();

        for module in source.modules()? {
            let asm = assemble(&module.source);
            if !asm.success() {
                return Err(LinkError::Assembly {
                    module: module.name,
                    errors: asm.errors,
                });
            }

            let base = cache.instructions.len() as u32;
            let data_base = data_len(&cache.data);
            let code_len = asm.instruction_count();

            let code_labels: Vec<(String, u32)> = asm
                .code_labels()
                .map(|(name, addr)| (name.to_string(), addr + base))
                .collect();
            let data_labels: Vec<(String, u32)> = asm
                .data_labels
                .iter()
                .map(|(name, offset)| (name.clone(), offset + data_base))
                .collect();
            for (name, _) in code_labels.iter().chain(&data_labels) {
                if let Some(first) = cache.owners.get(name) {
                    return Err(LinkError::DuplicateSymbol {
                        name: name.clone(),
                        first: first.clone(),
                        second: module.name,
                    });
                }
                cache.owners.insert(name.clone(), module.name.clone());
            }
            cache.labels.extend(code_labels);
            cache.data_labels.extend(data_labels);

            for mut instr in asm.instructions {
                let index = cache.instructions.len();
                for (operand, op) in instr.operands.iter_mut().enumerate() {
                    let OperandValue::Label(LabelRef::Resolved(addr)) = &mut op.value else {
                        continue;
                    };
                    if *addr < code_len {
                        *addr += base;
                    } else {
                        cache.fixups.push(DataFixup {
                            instruction: index,
                            operand,
                            offset: *addr - code_len + data_base,
                        });
                    }
                }
                cache.instructions.push(instr);
            }
            cache.data.extend(asm.data.iter().map(|b| DataByte {
                address: b.address + data_base,
                value: b.value,
            }));
            debug!(
                "stdlib module {} at {}..{}",
                module.name,
                base,
                cache.instructions.len()
            );
            cache.modules.push(ModuleSpan {
                name: module.name,
                base,
                len: cache.instructions.len() as u32 - base,
            });
        }

        // Calls between stdlib modules.
        for span in &cache.modules {
            let range = span.base as usize..(span.base + span.len) as usize;
            for instr in &mut cache.instructions[range] {
                resolve_or_fail(instr, &cache.labels, &span.name)?;
            }
        }

        info!(
            "stdlib: {} module(s), {} instruction(s), {} function(s), {} data byte(s)",
            cache.modules.len(),
            cache.instructions.len(),
            cache.labels.len(),
            cache.data.len()
        );
        Ok(cache)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn modules(&self) -> &[ModuleSpan] {
        &self.modules
    }

    /// Stdlib data, addressed from the start of the stdlib data.
    pub fn data(&self) -> &[DataByte] {
        &self.data
    }

    pub fn data_labels(&self) -> &LabelTable {
        &self.data_labels
    }
}

/// Output of a successful link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedProgram {
    pub instructions: Vec<Instruction>,
    /// User data followed by stdlib data, addressed after all linked code.
    pub data: Vec<DataByte>,
    /// Every code label in the linked stream, with global addresses.
    pub function_map: LabelTable,
    /// Every data label, relative to the data section.
    pub data_labels: LabelTable,
    /// Number of stdlib instructions.
    pub stdlib_size: u32,
    /// Index of the first user instruction.
    pub user_code_start: u32,
}

impl LinkedProgram {
    /// Views the linked program as one assembled unit, ready for the VM, the
    /// x86 generator or the bytecode encoder. [`ENTRY_LABEL`] marks
    /// [`LinkedProgram::user_code_start`].
    pub fn into_assembly(self) -> Assembly {
        let count = self.instructions.len() as u32;
        let mut labels = self.function_map;
        labels.insert(ENTRY_LABEL.to_string(), self.user_code_start);
        for (name, offset) in &self.data_labels {
            labels.insert(name.clone(), count + offset);
        }
        Assembly {
            instructions: self.instructions,
            data: self.data,
            labels,
            data_labels: self.data_labels,
            errors: Vec::new(),
        }
    }
}

/// Stdlib-aware linker with an explicit cache.
pub struct Linker<S: StdlibSource> {
    source: S,
    cache: Option<StdlibCache>,
}

impl<S: StdlibSource> Linker<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the source. Call [`Linker::invalidate`] afterwards for
    /// changes to take effect.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Drops the cached stdlib; the next link reassembles it.
    pub fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            debug!("stdlib cache invalidated");
        }
    }

    pub fn cache(&self) -> Option<&StdlibCache> {
        self.cache.as_ref()
    }

    fn stdlib(&mut self) -> Result<&StdlibCache, LinkError> {
        let cache = match self.cache.take() {
            Some(cache) => cache,
            None => StdlibCache::build(&self.source)?,
        };
        Ok(self.cache.insert(cache))
    }

    /// Links bare user instructions.
    pub fn link(
        &mut self,
        user: &[Instruction],
        required: &[&str],
    ) -> Result<LinkedProgram, LinkError> {
        self.link_parts(user, &[], &LabelTable::new(), &LabelTable::new(), required)
    }

    /// Like [`Linker::link`], reassembling the stdlib first.
    pub fn link_with_reload(
        &mut self,
        user: &[Instruction],
        required: &[&str],
    ) -> Result<LinkedProgram, LinkError> {
        self.invalidate();
        self.link(user, required)
    }

    /// Links a whole assembled unit, including its labels and data.
    pub fn link_assembly(
        &mut self,
        user: &Assembly,
        required: &[&str],
    ) -> Result<LinkedProgram, LinkError> {
        let code_labels: LabelTable = user
            .code_labels()
            .map(|(name, addr)| (name.to_string(), addr))
            .collect();
        self.link_parts(
            &user.instructions,
            &user.data,
            &code_labels,
            &user.data_labels,
            required,
        )
    }

    /// Assembles and links user source text.
    pub fn link_source(
        &mut self,
        source: &str,
        required: &[&str],
    ) -> Result<LinkedProgram, LinkError> {
        let user = assemble(source);
        if !user.success() {
            return Err(LinkError::Assembly {
                module: USER_MODULE.to_string(),
                errors: user.errors,
            });
        }
        self.link_assembly(&user, required)
    }

    fn link_parts(
        &mut self,
        user: &[Instruction],
        data: &[DataByte],
        code_labels: &LabelTable,
        data_labels: &LabelTable,
        required: &[&str],
    ) -> Result<LinkedProgram, LinkError> {
        let stdlib = self.stdlib()?;
        let user_code_start = stdlib.instructions.len() as u32;

        for name in code_labels.keys().chain(data_labels.keys()) {
            if let Some(first) = stdlib.owners.get(name) {
                return Err(LinkError::DuplicateSymbol {
                    name: name.clone(),
                    first: first.clone(),
                    second: USER_MODULE.to_string(),
                });
            }
        }
        let entry_owner = match stdlib.owners.get(ENTRY_LABEL) {
            Some(owner) => Some(owner.as_str()),
            None if code_labels.contains_key(ENTRY_LABEL)
                || data_labels.contains_key(ENTRY_LABEL) =>
            {
                Some(USER_MODULE)
            }
            None => None,
        };
        if let Some(owner) = entry_owner {
            return Err(LinkError::DuplicateSymbol {
                name: ENTRY_LABEL.to_string(),
                first: owner.to_string(),
                second: LINKER.to_string(),
            });
        }
        let mut function_map = stdlib.labels.clone();
        for (name, addr) in code_labels {
            function_map.insert(name.clone(), addr + user_code_start);
        }

        // Stdlib data goes after the user data.
        let user_data_len = data_len(data);
        let stdlib_data_start = user_code_start + user.len() as u32 + user_data_len;
        let mut instructions = stdlib.instructions.clone();
        for fixup in &stdlib.fixups {
            instructions[fixup.instruction].operands[fixup.operand].value =
                OperandValue::Label(LabelRef::Resolved(stdlib_data_start + fixup.offset));
        }
        instructions.reserve(user.len());
        for instr in user {
            let mut instr = instr.clone();
            rebase(&mut instr, user_code_start);
            resolve_or_fail(&mut instr, &function_map, USER_MODULE)?;
            instructions.push(instr);
        }

        for name in required {
            if !function_map.contains_key(*name) {
                return Err(LinkError::MissingFunction(name.to_string()));
            }
        }

        debug!(
            "linked {} stdlib + {} user instruction(s)",
            user_code_start,
            user.len()
        );
        let mut linked_data = data.to_vec();
        linked_data.extend(stdlib.data.iter().map(|b| DataByte {
            address: b.address + user_data_len,
            value: b.value,
        }));
        let mut linked_data_labels = data_labels.clone();
        for (name, offset) in &stdlib.data_labels {
            linked_data_labels.insert(name.clone(), offset + user_data_len);
        }

        Ok(LinkedProgram {
            instructions,
            data: linked_data,
            function_map,
            data_labels: linked_data_labels,
            stdlib_size: user_code_start,
            user_code_start,
        })
    }
}
