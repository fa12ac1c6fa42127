//! Vidgraph CLI library: assembly of the detection pipeline graph from a
//! run configuration.

pub mod pipeline;
