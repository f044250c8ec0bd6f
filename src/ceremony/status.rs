/// Where user-facing status lines go.
pub trait StatusLog: Send + Sync {
    fn log(&self, message: &str);
}

/// Prints every status line on stdout.
pub struct ConsoleStatus;

impl StatusLog for ConsoleStatus {
    fn log(&self, message: &str) {
        println!("{}", message);
    }
}
