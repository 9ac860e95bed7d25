//! Benchmarks for exrin live in `benches/`.
