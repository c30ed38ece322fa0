pub mod error;
pub mod executor;
pub mod install;
pub mod parser;
pub mod resolver;
pub mod script;
pub mod types;

pub use error::{ParseError, PathEscapeError};
pub use executor::apply;
pub use install::InstallInfo;
pub use parser::{load, parse};
pub use resolver::{resolve_all, InstallationRoot};
pub use script::BatchScript;
pub use types::{Action, OpKind, Operation, Outcome, PatchFile, Platform, ResolvedOp};
