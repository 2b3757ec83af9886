use tokio::sync::mpsc::Sender;

use crate::network::NetworkPackage;

/// A handle that addresses one registered server through the network.
pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
    fn server_id(&self) -> &str;
}
