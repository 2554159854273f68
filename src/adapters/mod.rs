// Adapters layer: concrete implementations for external systems (model APIs, storage).

pub mod openai;
pub mod registry;
pub mod storage;
