pub mod block;
pub mod ingress;
pub mod output_ptr;
pub mod packet;
pub mod policy;
pub mod router;
pub mod session;
