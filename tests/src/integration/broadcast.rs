//! Outbound broadcaster (C10) nonce semantics against mock EVM/SVM nodes,
//! per §4.7 and §8 scenario 5 (the Solana concurrent-broadcast race).

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use shared_types::{
        BlockConfirmation, ChainConfig, ChainId, ConfirmationType, EnabledFlags, Event, EventStatus, EventType,
        SigningData, VmType,
    };
    use uc_broadcast::{Broadcaster, BroadcasterConfig};
    use uc_chain::{ChainStores, DestinationClients, SharedSourceClient, SourceClient};
    use uc_store::{ChainStore, SharedChainStore};

    use crate::support::MockRpc;

    struct SingleChain {
        chain_id: ChainId,
        store: SharedChainStore,
    }

    impl ChainStores for SingleChain {
        fn store_for(&self, chain_id: &ChainId) -> Option<SharedChainStore> {
            (*chain_id == self.chain_id).then(|| self.store.clone())
        }
        fn chain_ids(&self) -> Vec<ChainId> {
            vec![self.chain_id.clone()]
        }
    }

    struct SingleClient {
        chain_id: ChainId,
        client: SharedSourceClient,
    }

    impl DestinationClients for SingleClient {
        fn get_client(&self, chain_id: &ChainId) -> Option<SharedSourceClient> {
            (*chain_id == self.chain_id).then(|| self.client.clone())
        }
    }

    fn evm_chain_config(rpc_url: &str) -> ChainConfig {
        ChainConfig {
            chain_id: ChainId::from("eip155:11155111"),
            vm_type: VmType::Evm,
            gateway_address: "0xGateway".into(),
            public_rpc_url: rpc_url.to_string(),
            enabled: EnabledFlags { inbound: true, outbound: true },
            block_confirmation: BlockConfirmation { fast: 1, standard: 12 },
            gateway_methods: vec![],
            poll_interval_secs: None,
            cleanup_interval_secs: None,
        }
    }

    fn svm_chain_config(rpc_url: &str) -> ChainConfig {
        ChainConfig {
            chain_id: ChainId::from("solana:mainnet"),
            vm_type: VmType::Svm,
            gateway_address: "GatewayProgram".into(),
            public_rpc_url: rpc_url.to_string(),
            enabled: EnabledFlags { inbound: true, outbound: true },
            block_confirmation: BlockConfirmation { fast: 1, standard: 32 },
            gateway_methods: vec![],
            poll_interval_secs: None,
            cleanup_interval_secs: None,
        }
    }

    fn signed_event(chain_id: &ChainId, destination: &str, nonce: u64) -> Event {
        let mut event = Event {
            event_id: "push-process-1".into(),
            chain_id: chain_id.clone(),
            block_height: 10,
            expiry_block_height: 1_010,
            event_type: EventType::Sign,
            confirmation_type: ConfirmationType::Instant,
            status: EventStatus::Signed,
            event_data: serde_json::json!({ "destination_chain_id": destination }),
            broadcasted_tx_hash: None,
            vote_tx_hash: None,
            terminal_at: None,
        };
        event.set_signing_data(&SigningData {
            signature_hex: "aa".repeat(65),
            signing_hash_hex: "0xdeadbeef".into(),
            nonce,
            gas_price: "1000".into(),
        });
        event
    }

    async fn run_once_against(
        chain_id: ChainId,
        client: SourceClient,
        event: Event,
    ) -> (SharedChainStore, EventStatus, Option<String>) {
        let dir = tempfile::tempdir().unwrap();
        let store: SharedChainStore = Arc::new(ChainStore::open(dir.path()).unwrap());
        store.insert_if_not_exists(&event).unwrap();

        let chains = Arc::new(SingleChain { chain_id: ChainId::from(ChainId::PUSH), store: store.clone() });
        let clients = Arc::new(SingleClient { chain_id, client: Arc::new(client) });
        let broadcaster = Broadcaster::new("tss-addr".into(), BroadcasterConfig::default(), chains, clients);
        broadcaster.run_once().await;

        let after = store.get(&event.event_id).unwrap().unwrap();
        (store, after.status, after.broadcasted_tx_hash)
    }

    #[tokio::test]
    async fn evm_already_committed_nonce_marks_broadcasted_without_sending() {
        let mock = MockRpc::start().await;
        let chain = evm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        *mock.state.tx_count.lock() = VecDeque::from([11]); // finalized nonce > event.nonce=10
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 10);
        let (_, status, hash) = run_once_against(destination, client, event).await;

        assert_eq!(status, EventStatus::Broadcasted);
        assert_eq!(hash, None);
        assert!(!mock.state.calls.lock().contains(&"eth_sendRawTransaction".to_string()));
    }

    #[tokio::test]
    async fn evm_successful_broadcast_records_caip_tagged_hash() {
        let mock = MockRpc::start().await;
        let chain = evm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        *mock.state.tx_count.lock() = VecDeque::from([10]); // not yet finalized
        *mock.state.send_raw_tx.lock() = Some(Ok("0xsolved".into()));
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 10);
        let (_, status, hash) = run_once_against(destination.clone(), client, event).await;

        assert_eq!(status, EventStatus::Broadcasted);
        assert_eq!(hash, Some(format!("{destination}:0xsolved")));
    }

    #[tokio::test]
    async fn evm_broadcast_error_with_advanced_nonce_marks_broadcasted_empty() {
        let mock = MockRpc::start().await;
        let chain = evm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        // Precheck sees the still-outstanding nonce; the send fails; the
        // re-check then observes another validator already landed it.
        *mock.state.tx_count.lock() = VecDeque::from([10, 11]);
        *mock.state.send_raw_tx.lock() = Some(Err("replacement transaction underpriced".into()));
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 10);
        let (_, status, hash) = run_once_against(destination, client, event).await;

        assert_eq!(status, EventStatus::Broadcasted);
        assert_eq!(hash, None);
    }

    #[tokio::test]
    async fn evm_broadcast_error_with_unchanged_nonce_stays_signed() {
        let mock = MockRpc::start().await;
        let chain = evm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        *mock.state.tx_count.lock() = VecDeque::from([10]);
        *mock.state.send_raw_tx.lock() = Some(Err("connection reset".into()));
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 10);
        let (_, status, _) = run_once_against(destination, client, event).await;

        assert_eq!(status, EventStatus::Signed);
    }

    #[tokio::test]
    async fn svm_strict_ordering_waits_when_not_its_turn() {
        let mock = MockRpc::start().await;
        let chain = svm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        *mock.state.svm_account_nonce.lock() = VecDeque::from([6]); // on-chain nonce behind event.nonce=7
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 7);
        let (_, status, _) = run_once_against(destination, client, event).await;

        assert_eq!(status, EventStatus::Signed);
    }

    /// §8 scenario 5, validator B's half: B's own broadcast errors, but its
    /// re-read shows the on-chain nonce already advanced past 7 -- meaning A
    /// won the race -- so B marks the event `Broadcasted` with no hash of
    /// its own, never double-spending the nonce.
    #[tokio::test]
    async fn svm_concurrent_broadcast_loser_marks_broadcasted_with_empty_hash() {
        let mock = MockRpc::start().await;
        let chain = svm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        *mock.state.svm_account_nonce.lock() = VecDeque::from([7, 8]);
        *mock.state.send_transaction.lock() = Some(Err("already processed".into()));
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 7);
        let (_, status, hash) = run_once_against(destination, client, event).await;

        assert_eq!(status, EventStatus::Broadcasted);
        assert_eq!(hash, None);
    }

    #[tokio::test]
    async fn svm_winning_broadcast_records_caip_tagged_signature() {
        let mock = MockRpc::start().await;
        let chain = svm_chain_config(&mock.url);
        let destination = chain.chain_id.clone();
        *mock.state.svm_account_nonce.lock() = VecDeque::from([7]);
        *mock.state.send_transaction.lock() = Some(Ok("solSig1".into()));
        let client = SourceClient::from_config(&chain, None);

        let event = signed_event(&ChainId::from(ChainId::PUSH), destination.as_str(), 7);
        let (_, status, hash) = run_once_against(destination.clone(), client, event).await;

        assert_eq!(status, EventStatus::Broadcasted);
        assert_eq!(hash, Some(format!("{destination}:solSig1")));
    }
}
