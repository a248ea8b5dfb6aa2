// Domain-layer modules and shared errors
pub mod identity {
    pub use crate::identity::*;
}

pub mod payload {
    pub use crate::payload::*;
}

pub mod dispatch {
    pub use crate::dispatch::*;
}

pub mod errors {
    pub use crate::errors::*;
}
