pub mod blender;
pub mod compute_scope;
pub mod engine;
pub mod job_manager;
pub mod model_registry;
pub mod networks;
pub mod scheduler;
pub mod storage;
pub mod tensor_io;
