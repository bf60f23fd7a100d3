//! Workspace root. Exports nothing — the workspace-level integration
//! tests under `tests/` are the only targets that matter here; use
//! the `polis` crate for the actual framework surface.
