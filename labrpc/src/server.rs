use crate::network::NetworkPackage;
use anyhow::Result;
use tokio::sync::mpsc::Sender;

#[async_trait::async_trait]
pub trait Server {
    type Service;
    fn from_service(svc: Self::Service) -> Self;
    fn client_chan(&self) -> Sender<NetworkPackage>;
    /// Handle one request. `Ok(false)` means no request can arrive any more;
    /// an error means the service failed and should be rebuilt.
    async fn handle(&mut self) -> Result<bool>;
    async fn run(&mut self) -> Result<()> {
        while self.handle().await? {}
        Ok(())
    }
}
