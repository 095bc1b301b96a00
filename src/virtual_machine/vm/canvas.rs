//! Host drawing surface driven by the canvas opcodes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A 2D path-drawing surface supplied by the host.
pub trait Canvas {
    fn move_to(&mut self, x: i32, y: i32);
    fn line_to(&mut self, x: i32, y: i32);
    fn stroke(&mut self);
    fn clear_rect(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn width(&self) -> i32;
    fn height(&self) -> i32;
}

/// A canvas call, as recorded by [`RecordingCanvas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCommand {
    MoveTo(i32, i32),
    LineTo(i32, i32),
    Stroke,
    ClearRect {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
}

impl fmt::Display for DrawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawCommand::MoveTo(x, y) => write!(f, "move_to({x}, {y})"),
            DrawCommand::LineTo(x, y) => write!(f, "line_to({x}, {y})"),
            DrawCommand::Stroke => write!(f, "stroke()"),
            DrawCommand::ClearRect {
                x,
                y,
                width,
                height,
            } => write!(f, "clear_rect({x}, {y}, {width}, {height})"),
        }
    }
}

/// Canvas that records every call.
///
/// Clones share one command log, so a host can keep a handle while the VM owns
/// the boxed canvas.
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    width: i32,
    height: i32,
    commands: Rc<RefCell<Vec<DrawCommand>>>,
}

impl RecordingCanvas {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            commands: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Snapshot of the calls recorded so far.
    pub fn commands(&self) -> Vec<DrawCommand> {
        self.commands.borrow().clone()
    }

    fn record(&self, command: DrawCommand) {
        self.commands.borrow_mut().push(command);
    }
}

impl Canvas for RecordingCanvas {
    fn move_to(&mut self, x: i32, y: i32) {
        self.record(DrawCommand::MoveTo(x, y));
    }

    fn line_to(&mut self, x: i32, y: i32) {
        self.record(DrawCommand::LineTo(x, y));
    }

    fn stroke(&mut self) {
        self.record(DrawCommand::Stroke);
    }

    fn clear_rect(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(DrawCommand::ClearRect {
            x,
            y,
            width,
            height,
        });
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }
}
