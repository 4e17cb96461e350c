//! Integration test: how a coordination attempt fails.
//!
//! Covers refusals by counterparties, double consumption caught by the
//! notary, unreachable parties and bad input at the boundary. In every case
//! no partial settlement may be committed.

use tally_core::{
    ContractError, CoordinationState, LedgerState, ObligationRecord, Party, ProtocolConfig,
    SettlementRecord,
};
use tally_crypto::KeyPair;
use tally_integration_tests::{settle_tx, TestNetwork, VIEWER};
use tally_settlement::{DateRange, Proposal, RecordStatus, SettlementError, SettlementNode};

const PARTIES: [&str; 3] = [VIEWER, "PartyA", "PartyB"];

// =========================================================================
// Refusals
// =========================================================================

#[tokio::test]
async fn test_tampered_input_is_refused_and_nothing_commits() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 40, "PartyB", "PartyA").await;
    let before = net.commits();

    // PartyA's local copy of one obligation no longer matches everyone else's.
    let a = net.node("PartyA");
    let mut forged: ObligationRecord = a
        .obligations(RecordStatus::Unconsumed)
        .await
        .into_iter()
        .find(|iou| iou.value == 40)
        .unwrap();
    forged.value = 4;
    a.vault().insert(LedgerState::Obligation(forged));

    let result = a.compensate(VIEWER, "PartyB", DateRange::unbounded()).await;
    match result {
        Err(SettlementError::SignatureRefused { party, reason }) => {
            assert_eq!(party, "Viewer");
            assert!(!reason.is_empty());
        }
        other => panic!("expected a refusal, got {:?}", other),
    }

    assert_eq!(net.commits(), before);
    for name in PARTIES {
        let node = net.node(name);
        assert!(node.settlements(RecordStatus::All).await.is_empty());
        assert_eq!(node.obligations(RecordStatus::Unconsumed).await.len(), 2);
    }
}

#[tokio::test]
async fn test_wrong_amount_is_rejected_before_any_contact() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 40, "PartyB", "PartyA").await;
    let opened_before = net.network.sessions_opened().len();

    let a = net.node("PartyA");
    let ious = a.obligations(RecordStatus::Unconsumed).await;
    let ipu = SettlementRecord::new(
        61,
        net.party(VIEWER),
        net.party("PartyB"),
        net.party("PartyA"),
    );
    let mut proposal = Proposal::new(settle_tx(ious, ipu));
    let result = a.coordinator().drive(&mut proposal).await;

    assert!(matches!(
        result,
        Err(SettlementError::ValidationFailed(
            ContractError::CompensationAmount {
                expected: 60,
                actual: 61
            }
        ))
    ));
    assert_eq!(proposal.state(), CoordinationState::Rejected);
    assert_eq!(
        proposal.history(),
        &[CoordinationState::Building, CoordinationState::Rejected]
    );
    assert_eq!(net.network.sessions_opened().len(), opened_before);
}

#[tokio::test]
async fn test_reversed_direction_is_rejected() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;

    let a = net.node("PartyA");
    let ious = a.obligations(RecordStatus::Unconsumed).await;
    let ipu = SettlementRecord::new(
        100,
        net.party(VIEWER),
        net.party("PartyA"),
        net.party("PartyB"),
    );
    let result = a.coordinator().propose(settle_tx(ious, ipu)).await;
    assert!(matches!(
        result,
        Err(SettlementError::ValidationFailed(ContractError::CompensationDirection))
    ));
    assert_eq!(net.commits(), 1);
}

#[tokio::test]
async fn test_viewer_cannot_be_impersonated_by_name() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    let opened_before = net.network.sessions_opened().len();

    // A settlement whose viewer is named "Viewer" but owned by PartyA's key,
    // so that only PartyA and PartyB would be asked to sign.
    let a = net.node("PartyA");
    let ious = a.obligations(RecordStatus::Unconsumed).await;
    let impostor = Party::new(VIEWER, net.party("PartyA").owning_key().clone());
    let ipu = SettlementRecord::new(100, impostor, net.party("PartyB"), net.party("PartyA"));
    let result = a.coordinator().propose(settle_tx(ious, ipu)).await;

    assert!(matches!(
        result,
        Err(SettlementError::ValidationFailed(ContractError::PartyKeyMismatch))
    ));
    assert_eq!(net.network.sessions_opened().len(), opened_before);
    assert_eq!(net.commits(), 1);
    let viewer = net.node(VIEWER);
    assert!(viewer.settlements(RecordStatus::All).await.is_empty());
    assert_eq!(viewer.obligations(RecordStatus::Unconsumed).await.len(), 1);
}

#[tokio::test]
async fn test_viewer_cannot_also_be_lender() {
    let net = TestNetwork::start(&PARTIES);
    let result = net
        .node("PartyA")
        .create_obligation(10, "PartyA", "PartyA", "PartyB")
        .await;
    assert!(matches!(result, Err(SettlementError::InvalidInput(_))));
    assert!(net.network.sessions_opened().is_empty());
    assert_eq!(net.commits(), 0);
}

// =========================================================================
// Double consumption
// =========================================================================

#[tokio::test]
async fn test_stale_settlement_conflicts_at_finality() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 40, "PartyB", "PartyA").await;

    let a = net.node("PartyA");
    let snapshot = a.obligations(RecordStatus::Unconsumed).await;
    a.compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await
        .unwrap();
    let committed = net.commits();

    let ipu = SettlementRecord::new(
        60,
        net.party(VIEWER),
        net.party("PartyB"),
        net.party("PartyA"),
    );
    let mut proposal = Proposal::new(settle_tx(snapshot, ipu));
    let result = a.coordinator().drive(&mut proposal).await;

    match result {
        Err(err @ SettlementError::ConflictingConsumption { .. }) => assert!(err.is_retryable()),
        other => panic!("expected a conflict, got {:?}", other),
    }
    // Every counterparty signed; only finality said no.
    assert_eq!(
        proposal.history(),
        &[
            CoordinationState::Building,
            CoordinationState::LocallyValidated,
            CoordinationState::CollectingSignatures,
            CoordinationState::Finalizing,
            CoordinationState::Rejected,
        ]
    );
    assert_eq!(net.commits(), committed);
    assert_eq!(net.node(VIEWER).settlements(RecordStatus::All).await.len(), 1);
}

#[tokio::test]
async fn test_racing_compensations_commit_once() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 40, "PartyB", "PartyA").await;

    let a = net.node("PartyA");
    let b = net.node("PartyB");
    let (first, second) = tokio::join!(
        a.compensate(VIEWER, "PartyB", DateRange::unbounded()),
        b.compensate(VIEWER, "PartyA", DateRange::unbounded()),
    );

    let wins = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "{:?} / {:?}", first, second);
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser,
        Err(SettlementError::ConflictingConsumption { .. }) | Err(SettlementError::InvalidInput(_))
    ));
    assert_eq!(net.node(VIEWER).settlements(RecordStatus::All).await.len(), 1);
}

// =========================================================================
// Unreachable parties
// =========================================================================

#[tokio::test]
async fn test_unreachable_first_counterparty_short_circuits() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    let opened_before = net.network.sessions_opened().len();

    // PartyA is the loaner, so it asks the viewer first.
    net.network.disconnect(&net.party(VIEWER));
    let result = net
        .node("PartyA")
        .compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await;

    match result {
        Err(err @ SettlementError::CommunicationFailure(_)) => assert!(err.is_retryable()),
        other => panic!("expected a communication failure, got {:?}", other),
    }
    assert_eq!(net.network.sessions_opened().len(), opened_before);
    assert_eq!(net.commits(), 1);
}

#[tokio::test]
async fn test_unreachable_second_counterparty_after_first_signed() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    let opened_before = net.network.sessions_opened().len();

    net.network.disconnect(&net.party("PartyB"));
    let result = net
        .node("PartyA")
        .compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await;

    assert!(matches!(result, Err(SettlementError::CommunicationFailure(_))));
    // The viewer's session was opened; PartyB's never was.
    let opened = net.network.sessions_opened();
    assert_eq!(opened.len(), opened_before + 1);
    assert_eq!(opened[opened_before].1, net.party(VIEWER));
    assert_eq!(net.commits(), 1);
    assert_eq!(net.node("PartyB").obligations(RecordStatus::Unconsumed).await.len(), 1);
}

#[tokio::test]
async fn test_silent_counterparty_times_out() {
    let config = ProtocolConfig {
        session_timeout_ms: 100,
        finality_timeout_ms: 2_000,
    };
    let net = TestNetwork::with_config(&[VIEWER, "PartyA"], config.clone());

    // PartyB is known to everyone but never answers its sessions.
    let silent = SettlementNode::new(
        "PartyB",
        KeyPair::generate(),
        net.directory.clone(),
        net.network.clone(),
        net.notary.clone(),
        config,
    );
    net.directory.register(silent.me().clone());
    let _inbox = net.network.register(silent.me());

    let result = net
        .node("PartyA")
        .create_obligation(5, VIEWER, "PartyA", "PartyB")
        .await;
    assert!(matches!(result, Err(SettlementError::CommunicationFailure(_))));
    assert_eq!(net.commits(), 0);
}

// =========================================================================
// Boundary input
// =========================================================================

#[tokio::test]
async fn test_boundary_rejections() {
    let net = TestNetwork::start(&PARTIES);
    let a = net.node("PartyA");

    assert!(matches!(
        a.create_obligation(0, VIEWER, "PartyA", "PartyB").await,
        Err(SettlementError::InvalidInput(_))
    ));
    assert!(matches!(
        a.create_obligation(5, VIEWER, "PartyA", "Nobody").await,
        Err(SettlementError::UnresolvedParty(name)) if name == "Nobody"
    ));
    assert!(matches!(
        a.create_obligation(5, VIEWER, "PartyA", "").await,
        Err(SettlementError::InvalidInput(_))
    ));
    assert!(matches!(
        a.compensate(VIEWER, "PartyA", DateRange::unbounded()).await,
        Err(SettlementError::InvalidInput(_))
    ));
    match a.compensate(VIEWER, "PartyB", DateRange::unbounded()).await {
        Err(SettlementError::InvalidInput(msg)) => {
            assert!(msg.contains("nothing to compensate"));
            assert!(msg.contains("PartyB"));
        }
        other => panic!("expected nothing to compensate, got {:?}", other),
    }
    assert_eq!(net.commits(), 0);
}

#[tokio::test]
async fn test_notary_is_not_a_peer_and_cannot_be_a_party() {
    let net = TestNetwork::start(&PARTIES);
    let peers = net.node(VIEWER).peers().await;
    assert!(peers.iter().all(|p| !p.is_named("Notary")));

    // The notary resolves but never answers a session.
    let result = net
        .node("PartyA")
        .create_obligation(5, "Notary", "PartyA", "PartyB")
        .await;
    assert!(result.is_err());
    assert_eq!(net.commits(), 0);
}
