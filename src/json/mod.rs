//! Purpose: Internal JSON parsing boundary shared by the decode paths.
//! Exports: `parse` module with the byte-to-tree helper and failure categories.
//! Role: Single seam for parser usage so callsites avoid ad hoc decode logic.
//! Invariants: Payload bytes become a `serde_json::Value` only through this module.
//! Invariants: Helper APIs stay small and deterministic (no hidden global state).

pub(crate) mod parse;
