pub mod calendar_tools;
pub mod config;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod task_tools;
pub mod tool;

pub use calendar_tools::*;
pub use config::*;
pub use error::*;
pub use gate::*;
pub use orchestrator::*;
pub use parser::*;
pub use session::*;
pub use task_tools::*;
pub use tool::*;

use std::sync::Arc;

use taskwren_backend::Backend;

/// Register the full calendar/task capability set against one backend.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    backend: Arc<dyn Backend>,
) -> Result<(), DispatchError> {
    registry.register(Arc::new(ListEventsTool::new(backend.clone())))?;
    registry.register(Arc::new(CreateEventTool::new(backend.clone())))?;
    registry.register(Arc::new(UpdateEventTool::new(backend.clone())))?;
    registry.register(Arc::new(DeleteEventTool::new(backend.clone())))?;
    registry.register(Arc::new(ListTasksTool::new(backend.clone())))?;
    registry.register(Arc::new(CreateTaskTool::new(backend.clone())))?;
    registry.register(Arc::new(UpdateTaskTool::new(backend.clone())))?;
    registry.register(Arc::new(CompleteTaskTool::new(backend)))?;
    Ok(())
}
