//! gRPC server implementation.

mod todo_grpc;

pub use todo_grpc::TodoGrpcService;
