//! Greeting used by `itemcast greet`.

/// Return a greeting for `name`.
pub fn greet(name: &str) -> String {
    format!("Hello, {name}!")
}
