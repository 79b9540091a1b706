mod args;

pub use args::{Args, Command, NodeArgs, OutputFormat};
