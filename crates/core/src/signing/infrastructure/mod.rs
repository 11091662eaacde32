pub mod in_memory_signature_repository;
pub mod journal_signature_repository;
