pub mod factory;
pub mod llm;
pub mod stages;
