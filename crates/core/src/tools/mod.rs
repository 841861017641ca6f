mod registry;

pub use registry::{FnTool, Tool, ToolDescriptor, ToolExecutor, ToolRegistry};
