//! Unit tests for ScriptError and ErrorKind

use core_types::{ErrorKind, ScriptError, StackFrame};

#[test]
fn test_stack_trace_lists_frames_innermost_first() {
    let error = ScriptError {
        kind: ErrorKind::Error,
        message: "boom".to_string(),
        stack: vec![
            StackFrame::new("inner", Some("res/a.js")),
            StackFrame::new("outer", None),
        ],
    };
    assert_eq!(
        error.stack_trace(),
        "    at inner (res/a.js)\n    at outer (native)"
    );
}

#[test]
fn test_error_is_std_error() {
    let error: Box<dyn std::error::Error> =
        Box::new(ScriptError::new(ErrorKind::RangeError, "out of range"));
    assert_eq!(error.to_string(), "RangeError: out of range");
}
