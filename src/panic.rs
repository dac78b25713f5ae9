use std::panic::{catch_unwind, AssertUnwindSafe};

/// Invokes `f`, turning a panic into a formatted message rather than
/// unwinding past the dispatch loop.
///
/// Different from the teacher's WASM-host `catch_panic`, this runs natively
/// and can rely on ordinary stack unwinding; there is no host trap to route
/// through.
pub fn catch_handler<F: FnOnce() -> R, R>(f: F) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| describe_panic(&payload))
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_string_panic_message() {
        let result = catch_handler(|| -> i32 { panic!("boom") });
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn passes_through_successful_result() {
        let result = catch_handler(|| 42);
        assert_eq!(result.unwrap(), 42);
    }
}
