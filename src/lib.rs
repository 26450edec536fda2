// Library root
// ------------
// The binary (`main.rs`) only parses arguments, sets up logging and wires
// these modules together, so the upload loop can be driven from tests with
// fake collaborators.
//
// Module responsibilities:
// - `config`: CLI flags, compiled-in defaults, credential and retry policy.
// - `api`: the `Uploader` capability and the Roboflow HTTP client.
// - `ledger`: the append-only success and failure logs.
// - `batch`: candidate collection, resume filtering and the retry loop.
// - `ui`: console output, a progress bar plus a message stream.
pub mod api;
pub mod batch;
pub mod config;
pub mod ledger;
pub mod ui;
