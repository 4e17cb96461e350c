//! Bilateral netting of obligations into a single settlement position.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::records::ObligationRecord;
use crate::types::Party;

/// The single net amount and direction owed between two parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPosition {
    /// The party that owes the net amount.
    pub payer: Party,
    /// The party that is owed the net amount.
    pub loaner: Party,
    /// Net amount, `|owed to A - owed to B|`.
    pub amount: u64,
}

/// Total value of the obligations whose lender is `lender`.
pub fn total_owed_to<'a>(
    obligations: impl IntoIterator<Item = &'a ObligationRecord>,
    lender: &Party,
) -> u128 {
    obligations
        .into_iter()
        .filter(|o| o.lender == *lender)
        .map(|o| o.value as u128)
        .sum()
}

/// Net a set of obligations between `party_a` and `party_b`.
///
/// `owed_to_a` is what B owes A and `owed_to_b` what A owes B. If B is owed
/// strictly more, A pays; otherwise B pays. Equal debts therefore resolve to
/// payer B, loaner A with a zero amount.
pub fn net(
    obligations: &[ObligationRecord],
    party_a: &Party,
    party_b: &Party,
) -> Result<NetPosition, CoreError> {
    if obligations.is_empty() {
        return Err(CoreError::NothingToNet);
    }
    if party_a == party_b {
        return Err(CoreError::ValidationError(
            "cannot net a party against itself".into(),
        ));
    }
    if let Some(foreign) = obligations.iter().find(|o| !o.is_between(party_a, party_b)) {
        return Err(CoreError::ForeignObligation { id: foreign.id });
    }

    let owed_to_a = total_owed_to(obligations, party_a);
    let owed_to_b = total_owed_to(obligations, party_b);
    let amount = u64::try_from(owed_to_a.abs_diff(owed_to_b)).map_err(|_| {
        CoreError::InvalidAmount(format!(
            "net amount between {} and {} exceeds u64",
            party_a, party_b
        ))
    })?;

    let (payer, loaner) = if owed_to_b > owed_to_a {
        (party_a.clone(), party_b.clone())
    } else {
        (party_b.clone(), party_a.clone())
    };

    tracing::debug!(
        payer = %payer,
        loaner = %loaner,
        amount,
        obligations = obligations.len(),
        "netted obligations"
    );

    Ok(NetPosition {
        payer,
        loaner,
        amount,
    })
}
