use alloy_primitives::Address;

use crate::{
    error::{Result, SafeError},
    hex::parse_address,
};

/// Owner additions and removals that turn one owner list into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerChangeSet {
    /// Owners of the current list missing from the expected one, in current-list order.
    pub owners_to_remove: Vec<Address>,
    /// Owners of the expected list missing from the current one, in expected-list order.
    pub owners_to_add: Vec<Address>,
}

impl OwnerChangeSet {
    pub fn is_empty(&self) -> bool {
        self.owners_to_remove.is_empty() && self.owners_to_add.is_empty()
    }
}

/// Diffs two owner lists under canonical address equality.
///
/// Both lists must contain valid, pairwise distinct addresses; the error names the list,
/// the index and the offending value. Reordering alone produces an empty change set.
pub fn diff_owners<C, E>(current: &[C], expected: &[E]) -> Result<OwnerChangeSet>
where
    C: AsRef<str>,
    E: AsRef<str>,
{
    let current = parse_owner_list("current owners", current)?;
    let expected = parse_owner_list("expected owners", expected)?;

    let owners_to_remove =
        current.iter().filter(|owner| !expected.contains(owner)).copied().collect();
    let owners_to_add =
        expected.iter().filter(|owner| !current.contains(owner)).copied().collect();

    Ok(OwnerChangeSet {
        owners_to_remove,
        owners_to_add,
    })
}

fn parse_owner_list<S: AsRef<str>>(name: &str, owners: &[S]) -> Result<Vec<Address>> {
    let mut parsed: Vec<Address> = Vec::with_capacity(owners.len());

    for (index, raw) in owners.iter().enumerate() {
        let raw = raw.as_ref();
        let address = parse_address(raw).ok_or_else(|| {
            SafeError::InvalidFormat(format!("Invalid address in {name} at index {index}: {raw}"))
        })?;

        if parsed.contains(&address) {
            return Err(SafeError::InvalidFormat(format!(
                "Duplicate address in {name} at index {index}: {raw}"
            )));
        }
        parsed.push(address);
    }

    Ok(parsed)
}
