//! Model backends: the `Embedder`/`Generator` seams and their llama.cpp
//! sidecar implementation.

mod llama;
mod provider;

pub use llama::{LlamaServer, SidecarConfig};
pub use provider::{Embedder, Generator};
