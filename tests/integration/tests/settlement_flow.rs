//! Integration test: obligations issued and netted across three nodes.
//!
//! Exercises tally-settlement's boundary operations end to end, with the
//! coordination protocol, the responders and the notary all in the loop.

use chrono::{Duration, Utc};
use tally_core::{Action, CoordinationState, SettlementRecord};
use tally_integration_tests::{settle_tx, TestNetwork, VIEWER};
use tally_settlement::{DateRange, PartyRole, Proposal, RecordStatus};

const PARTIES: [&str; 3] = [VIEWER, "PartyA", "PartyB"];

// =========================================================================
// Issuing obligations
// =========================================================================

#[tokio::test]
async fn test_issue_is_recorded_by_all_three_parties() {
    let net = TestNetwork::start(&PARTIES);
    let signed = net.issue("PartyB", 25, "PartyA", "PartyB").await;

    assert_eq!(signed.tx.action, Action::Create);
    assert!(signed.verify_signatures().is_ok());
    assert_eq!(net.commits(), 1);

    for name in PARTIES {
        let ious = net.node(name).obligations(RecordStatus::Unconsumed).await;
        assert_eq!(ious.len(), 1, "{}", name);
        assert_eq!(ious[0].value, 25);
        assert_eq!(ious[0].lender, net.party("PartyA"));
        assert_eq!(ious[0].borrower, net.party("PartyB"));
    }
}

#[tokio::test]
async fn test_viewer_can_propose_an_obligation() {
    let net = TestNetwork::start(&PARTIES);
    net.issue(VIEWER, 12, "PartyB", "PartyA").await;

    let lent = net
        .node("PartyA")
        .obligations_by_role(PartyRole::Borrower, "PartyA", RecordStatus::Unconsumed)
        .await
        .unwrap();
    assert_eq!(lent.len(), 1);
    assert_eq!(lent[0].value, 12);
}

#[tokio::test]
async fn test_names_resolve_case_insensitively() {
    let net = TestNetwork::start(&PARTIES);
    let signed = net
        .node("partya")
        .create_obligation(3, "VIEWER", " partya ", "PARTYB")
        .await
        .unwrap();
    let participants: Vec<String> = signed
        .tx
        .participants()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(participants, vec!["Viewer", "PartyA", "PartyB"]);
}

// =========================================================================
// Netting
// =========================================================================

#[tokio::test]
async fn test_compensate_nets_opposing_obligations() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyB", 40, "PartyB", "PartyA").await;

    let signed = net
        .node("PartyA")
        .compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await
        .unwrap();
    assert_eq!(signed.tx.action, Action::Settle);
    assert_eq!(signed.tx.inputs.len(), 2);
    assert_eq!(net.commits(), 3);

    for name in PARTIES {
        let node = net.node(name);
        let ipus = node.settlements(RecordStatus::Unconsumed).await;
        assert_eq!(ipus.len(), 1, "{}", name);
        assert_eq!(ipus[0].payer, net.party("PartyB"));
        assert_eq!(ipus[0].loaner, net.party("PartyA"));
        assert_eq!(ipus[0].viewer, net.party(VIEWER));
        assert_eq!(ipus[0].value, 60);
        assert!(node.obligations(RecordStatus::Unconsumed).await.is_empty());
    }
}

#[tokio::test]
async fn test_compensate_from_the_other_side_gives_the_same_direction() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 40, "PartyB", "PartyA").await;

    net.node("PartyB")
        .compensate(VIEWER, "PartyA", DateRange::unbounded())
        .await
        .unwrap();

    let ipus = net.node(VIEWER).settlements(RecordStatus::Unconsumed).await;
    assert_eq!(ipus[0].payer, net.party("PartyB"));
    assert_eq!(ipus[0].loaner, net.party("PartyA"));
    assert_eq!(ipus[0].value, 60);
}

#[tokio::test]
async fn test_compensate_one_directional_debt() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 10, "PartyB", "PartyA").await;
    net.issue("PartyA", 15, "PartyB", "PartyA").await;

    net.node("PartyB")
        .compensate(VIEWER, "PartyA", DateRange::unbounded())
        .await
        .unwrap();

    let ipu = net.node("PartyA").settlements(RecordStatus::Unconsumed).await.remove(0);
    assert_eq!(ipu.payer, net.party("PartyA"));
    assert_eq!(ipu.loaner, net.party("PartyB"));
    assert_eq!(ipu.value, 25);
}

#[tokio::test]
async fn test_compensate_tie_depends_on_proposer() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 50, "PartyA", "PartyB").await;
    net.issue("PartyA", 50, "PartyB", "PartyA").await;

    net.node("PartyA")
        .compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await
        .unwrap();
    let ipu = net.node("PartyA").settlements(RecordStatus::Unconsumed).await.remove(0);
    assert_eq!(ipu.value, 0);
    assert_eq!(ipu.payer, net.party("PartyB"));
    assert_eq!(ipu.loaner, net.party("PartyA"));

    let other = TestNetwork::start(&PARTIES);
    other.issue("PartyA", 50, "PartyA", "PartyB").await;
    other.issue("PartyA", 50, "PartyB", "PartyA").await;
    other
        .node("PartyB")
        .compensate(VIEWER, "PartyA", DateRange::unbounded())
        .await
        .unwrap();
    let ipu = other.node("PartyB").settlements(RecordStatus::Unconsumed).await.remove(0);
    assert_eq!(ipu.value, 0);
    assert_eq!(ipu.payer, other.party("PartyA"));
    assert_eq!(ipu.loaner, other.party("PartyB"));
}

#[tokio::test]
async fn test_compensate_only_selects_the_pair_and_viewer() {
    let net = TestNetwork::start(&[VIEWER, "Auditor", "PartyA", "PartyB", "PartyC"]);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 30, "PartyA", "PartyC").await;
    net.node("PartyA")
        .create_obligation(70, "Auditor", "PartyB", "PartyA")
        .await
        .unwrap();

    let signed = net
        .node("PartyA")
        .compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await
        .unwrap();
    assert_eq!(signed.tx.inputs.len(), 1);

    let remaining = net.node("PartyA").obligations(RecordStatus::Unconsumed).await;
    assert_eq!(remaining.len(), 2);
    let ipu = signed.tx.settlement_outputs()[0].clone();
    assert_eq!(ipu.value, 100);
}

#[tokio::test]
async fn test_compensate_respects_the_date_range() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;

    let now = Utc::now();
    let range = DateRange::between(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
    net.node("PartyA")
        .compensate(VIEWER, "PartyB", range)
        .await
        .unwrap();
    assert_eq!(net.node("PartyB").settlements(RecordStatus::All).await.len(), 1);

    net.issue("PartyA", 5, "PartyA", "PartyB").await;
    let future = DateRange::new(Some(now + Duration::days(1)), None).unwrap();
    assert!(net
        .node("PartyA")
        .compensate(VIEWER, "PartyB", future)
        .await
        .is_err());
}

#[tokio::test]
async fn test_settlements_can_be_netted_again_after_new_obligations() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 10, "PartyA", "PartyB").await;
    net.node("PartyA")
        .compensate(VIEWER, "PartyB", DateRange::unbounded())
        .await
        .unwrap();

    net.issue("PartyB", 4, "PartyB", "PartyA").await;
    net.node("PartyB")
        .compensate(VIEWER, "PartyA", DateRange::unbounded())
        .await
        .unwrap();

    let ipus = net.node(VIEWER).settlements(RecordStatus::Unconsumed).await;
    assert_eq!(ipus.len(), 2);
    assert!(net.node(VIEWER).obligations(RecordStatus::Unconsumed).await.is_empty());
}

// =========================================================================
// Proposer roles
// =========================================================================

#[tokio::test]
async fn test_viewer_proposes_a_settlement() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    net.issue("PartyA", 40, "PartyB", "PartyA").await;

    let viewer = net.node(VIEWER);
    let ious = viewer.obligations(RecordStatus::Unconsumed).await;
    let ipu = SettlementRecord::new(
        60,
        net.party(VIEWER),
        net.party("PartyB"),
        net.party("PartyA"),
    );
    let opened_before = net.network.sessions_opened().len();
    let mut proposal = Proposal::new(settle_tx(ious, ipu));
    viewer.coordinator().drive(&mut proposal).await.unwrap();
    assert_eq!(proposal.state(), CoordinationState::Committed);

    // Loaner first, then payer.
    let opened = net.network.sessions_opened();
    let new_sessions = &opened[opened_before..];
    assert_eq!(new_sessions.len(), 2);
    assert_eq!(new_sessions[0].1, net.party("PartyA"));
    assert_eq!(new_sessions[1].1, net.party("PartyB"));

    assert_eq!(net.node("PartyB").settlements(RecordStatus::Unconsumed).await.len(), 1);
}

#[tokio::test]
async fn test_payer_solicits_viewer_then_loaner() {
    let net = TestNetwork::start(&PARTIES);
    net.issue("PartyA", 100, "PartyA", "PartyB").await;
    let opened_before = net.network.sessions_opened().len();

    // PartyB owes, so it is the payer.
    net.node("PartyB")
        .compensate(VIEWER, "PartyA", DateRange::unbounded())
        .await
        .unwrap();

    let opened = net.network.sessions_opened();
    let new_sessions = &opened[opened_before..];
    assert_eq!(new_sessions.len(), 2);
    assert_eq!(new_sessions[0].0, net.party("PartyB"));
    assert_eq!(new_sessions[0].1, net.party(VIEWER));
    assert_eq!(new_sessions[1].1, net.party("PartyA"));
}

#[tokio::test]
async fn test_disjoint_compensations_run_concurrently() {
    let net = TestNetwork::start(&[VIEWER, "PartyA", "PartyB", "PartyC", "PartyD"]);
    net.issue("PartyA", 9, "PartyA", "PartyB").await;
    net.issue("PartyC", 4, "PartyC", "PartyD").await;

    let ab = net.node("PartyA");
    let cd = net.node("PartyD");
    let (first, second) = tokio::join!(
        ab.compensate(VIEWER, "PartyB", DateRange::unbounded()),
        cd.compensate(VIEWER, "PartyC", DateRange::unbounded()),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(net.node(VIEWER).settlements(RecordStatus::Unconsumed).await.len(), 2);
}
