pub mod sfu {
    tonic::include_proto!("sfu");
}

pub use sfu::*;
