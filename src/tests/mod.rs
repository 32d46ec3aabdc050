//! Pipeline-level tests for the binary: configuration through published
//! bitmap, exercised the same way a timer tick would.
