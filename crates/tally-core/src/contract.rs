//! The settlement contract: the one rule set every party runs against a
//! proposed transaction before signing it.
//!
//! Verification is pure and deterministic. Roles are matched through
//! [`Party`]'s canonical equality, and a settlement must carry each party's
//! owning key over from the obligations it consumes.

use std::collections::HashSet;

use crate::error::ContractError;
use crate::netting::total_owed_to;
use crate::records::{ObligationRecord, SettlementRecord};
use crate::transaction::{Action, Transaction};
use crate::types::{OwningKey, Party};

/// Rule set for obligation and settlement transactions.
pub struct SettlementContract;

impl SettlementContract {
    /// Accept or reject a transaction. The error names the first violated rule.
    pub fn verify(tx: &Transaction) -> Result<(), ContractError> {
        match &tx.action {
            Action::Create => Self::verify_create(tx),
            Action::Settle => Self::verify_settle(tx),
            Action::Other(name) => Err(ContractError::UnknownAction(name.clone())),
        }
    }

    fn verify_create(tx: &Transaction) -> Result<(), ContractError> {
        require(tx.inputs.is_empty(), ContractError::CreateConsumesInputs)?;
        require(tx.outputs.len() == 1, ContractError::CreateOutputCount)?;

        let outputs = tx.obligation_outputs();
        require(outputs.len() == tx.outputs.len(), ContractError::InvalidOutputs)?;
        let out = outputs[0];

        require(out.lender != out.borrower, ContractError::LenderIsBorrower)?;
        require(
            signers_cover(&tx.signers, out.participants()),
            ContractError::MissingSigners,
        )?;
        require(out.value > 0, ContractError::NonPositiveValue)?;
        Ok(())
    }

    fn verify_settle(tx: &Transaction) -> Result<(), ContractError> {
        let inputs = tx.obligation_inputs();
        let outputs = tx.settlement_outputs();

        require(!inputs.is_empty(), ContractError::NoObligationInputs)?;
        require(outputs.len() == 1, ContractError::SettlementOutputCount)?;
        require(tx.outputs.len() == outputs.len(), ContractError::InvalidOutputs)?;
        require(tx.inputs.len() == inputs.len(), ContractError::InvalidInputs)?;

        let out = outputs[0];

        require(
            signers_cover(&tx.signers, out.participants()),
            ContractError::MissingSigners,
        )?;
        require(
            inputs.iter().all(|iou| obligation_parties_distinct(iou)),
            ContractError::InputPartiesNotDistinct,
        )?;
        require(out.has_distinct_parties(), ContractError::OutputPartiesNotDistinct)?;
        require(
            inputs.iter().all(|iou| iou.viewer == out.viewer),
            ContractError::ViewerMismatch,
        )?;
        require(
            inputs.iter().all(|iou| {
                is_either(&iou.lender, &out.payer, &out.loaner)
                    && is_either(&iou.borrower, &out.payer, &out.loaner)
            }),
            ContractError::PartyClosure,
        )?;
        require(
            inputs.iter().all(|iou| {
                iou.viewer.is_same_identity(&out.viewer)
                    && keeps_identity(&iou.lender, out)
                    && keeps_identity(&iou.borrower, out)
            }),
            ContractError::PartyKeyMismatch,
        )?;

        // Values are unsigned, so the non-negativity rules hold by construction.

        let debt_of_payer = total_owed_to(inputs.iter().copied(), &out.loaner);
        let debt_of_loaner = total_owed_to(inputs.iter().copied(), &out.payer);
        require(
            debt_of_payer >= debt_of_loaner,
            ContractError::CompensationDirection,
        )?;
        let expected = debt_of_payer - debt_of_loaner;
        require(
            expected == out.value as u128,
            ContractError::CompensationAmount {
                expected,
                actual: out.value,
            },
        )?;
        Ok(())
    }
}

fn require(condition: bool, violation: ContractError) -> Result<(), ContractError> {
    if condition {
        Ok(())
    } else {
        Err(violation)
    }
}

fn signers_cover<'a>(signers: &[OwningKey], parties: impl IntoIterator<Item = &'a Party>) -> bool {
    let declared: HashSet<&OwningKey> = signers.iter().collect();
    parties
        .into_iter()
        .all(|party| declared.contains(party.owning_key()))
}

fn obligation_parties_distinct(iou: &ObligationRecord) -> bool {
    iou.viewer != iou.lender && iou.viewer != iou.borrower && iou.lender != iou.borrower
}

fn is_either(party: &Party, first: &Party, second: &Party) -> bool {
    party == first || party == second
}

fn keeps_identity(party: &Party, out: &SettlementRecord) -> bool {
    party.is_same_identity(&out.payer) || party.is_same_identity(&out.loaner)
}
