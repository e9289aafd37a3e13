// Integration tests for the edge engine, compiled as one binary.
// Each module drives the public API against the in-process RecordingBackend.

mod support;

mod analytics;
mod inference;
mod lifecycle;
