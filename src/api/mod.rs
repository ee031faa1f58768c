pub mod dryrun_dto;
pub mod response_dto;
pub mod task_dto;
pub mod vdag_dto;
