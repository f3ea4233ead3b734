use async_trait::async_trait;

use crate::{
    client::{Client, ClientError},
    message::{FitIns, FitRes},
};

/// The coordinator's handle on a client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientProxy: Send {
    /// Sends a fit instruction to the client and waits for its result.
    async fn fit(&mut self, ins: FitIns) -> Result<FitRes, ClientError>;
}

/// A proxy on a client living in the same process.
#[derive(Debug)]
pub struct LocalClientProxy {
    client: Client,
}

impl LocalClientProxy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientProxy for LocalClientProxy {
    async fn fit(&mut self, ins: FitIns) -> Result<FitRes, ClientError> {
        self.client.fit(ins)
    }
}
