pub mod card_network;

pub use card_network::CardNetworkClient;

/// A definitive acknowledgement from a payout provider.
#[derive(Debug, Clone)]
pub struct TransferConfirmation {
    pub provider_payout_id: String,
}
