pub mod in_memory_template_store;
pub mod json_template_store;
