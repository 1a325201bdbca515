//! No library surface of its own — see `tests/` for the end-to-end
//! scenarios exercised against the reply pipeline and processor contract.
