//! Statement execution, procedure invocation, and the `Interpreter` that
//! owns TRX's runtime state (§4.3, §4.5, §5).

mod context;
mod interpreter;
mod invoke;
mod statement;

pub use context::{ExecContext, Flow};
pub use interpreter::Interpreter;
pub use invoke::{coerce_path_param, invoke};
pub use statement::exec_block;
