//! Joining account flags held by bank partitions onto central transactions.
//!
//! A transaction travels through a chain of banks. All legs of a chain share the same UETR,
//! and the bank receiving the chronologically last leg is the *final receiver*: the bank
//! holding the beneficiary account. The pair `(final receiver, beneficiary account)` is the
//! key under which a bank partition can attach its account flag to a transaction without
//! either side seeing the other's data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{DataError, FlagTable, TransactionTable};
use crate::payload::TransactionKeys;

/// The key joining a transaction to an account flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinKey {
    pub final_receiver: String,
    pub account: String,
}

/// Computes the final receiver of every transaction, in row order.
///
/// The final receiver of a UETR group is the receiver of its leg with the latest timestamp.
/// Legs with identical timestamps are ordered by message id, which makes the result
/// independent of the row order.
pub fn add_final_receiver(transactions: &TransactionTable) -> Vec<String> {
    let mut last_legs: HashMap<&str, (&str, &str, &str)> = HashMap::new();
    for row in transactions.rows() {
        let leg = (
            row.timestamp.as_str(),
            row.message_id.as_str(),
            row.receiver.as_str(),
        );
        last_legs
            .entry(row.uetr.as_str())
            .and_modify(|last| {
                if (leg.0, leg.1) > (last.0, last.1) {
                    *last = leg;
                }
            })
            .or_insert(leg);
    }
    transactions
        .rows()
        .iter()
        .map(|row| last_legs[row.uetr.as_str()].2.to_string())
        .collect()
}

/// Derives the join keys (and the labels if `labelled`) of every transaction.
///
/// # Errors
/// Fails if labels are requested and a transaction has none.
pub fn transaction_keys(
    transactions: &TransactionTable,
    labelled: bool,
) -> Result<TransactionKeys, DataError> {
    let keys = add_final_receiver(transactions)
        .into_iter()
        .zip(transactions.rows())
        .map(|(final_receiver, row)| JoinKey {
            final_receiver,
            account: row.beneficiary_account.clone(),
        })
        .collect();
    let labels = if labelled {
        let labels = transactions
            .rows()
            .iter()
            .map(|row| {
                row.label
                    .ok_or_else(|| DataError::MissingLabel(row.message_id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Some(labels)
    } else {
        None
    };
    Ok(TransactionKeys::from_table_parts(transactions.index(), keys, labels))
}

/// Left-joins the account flags onto the given keys.
///
/// Returns one entry per key, in order: the flag of the `(bank, account)` matching
/// `(final receiver, account)` or `None` if there is no match. If the flag table holds the
/// same account twice, its first row is used.
pub fn join_flags<'a>(
    keys: impl IntoIterator<Item = &'a JoinKey>,
    flags: &FlagTable,
) -> Vec<Option<String>> {
    let mut lookup: HashMap<(&str, &str), Option<&str>> = HashMap::new();
    for row in flags.rows() {
        lookup
            .entry((row.bank.as_str(), row.account.as_str()))
            .or_insert_with(|| row.flags.as_deref());
    }
    keys.into_iter()
        .map(|key| {
            lookup
                .get(&(key.final_receiver.as_str(), key.account.as_str()))
                .and_then(|flag| flag.map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        tests::{BANK_CSV, SWIFT_CSV},
        AccountFlag,
        Transaction,
    };

    fn leg(id: &str, timestamp: &str, uetr: &str, receiver: &str) -> Transaction {
        Transaction {
            message_id: id.to_string(),
            timestamp: timestamp.to_string(),
            uetr: uetr.to_string(),
            receiver: receiver.to_string(),
            beneficiary_account: "acct".to_string(),
            instructed_currency: None,
            label: None,
        }
    }

    #[test]
    fn test_final_receiver_is_last_leg() {
        let table = TransactionTable::from_reader(SWIFT_CSV.as_bytes()).unwrap();
        assert_eq!(add_final_receiver(&table), vec!["bankC", "bankC", "bankD"]);
    }

    #[test]
    fn test_final_receiver_stable_under_reordering() {
        let legs = vec![
            leg("a", "2022-01-01 10:00", "u1", "b1"),
            leg("b", "2022-01-01 12:00", "u1", "b3"),
            leg("c", "2022-01-01 11:00", "u1", "b2"),
            leg("d", "2022-01-01 11:00", "u2", "b4"),
            leg("e", "2022-01-01 11:00", "u2", "b5"),
        ];
        let expected: HashMap<String, String> = {
            let table = TransactionTable::new(legs.clone()).unwrap();
            table
                .index()
                .into_iter()
                .zip(add_final_receiver(&table))
                .collect()
        };
        assert_eq!(expected["a"], "b3");
        assert_eq!(expected["d"], "b5");

        let mut reversed = legs;
        reversed.reverse();
        let table = TransactionTable::new(reversed).unwrap();
        for (id, receiver) in table.index().into_iter().zip(add_final_receiver(&table)) {
            assert_eq!(expected[&id], receiver);
        }
    }

    #[test]
    fn test_transaction_keys() {
        let table = TransactionTable::from_reader(SWIFT_CSV.as_bytes()).unwrap();
        let keys = transaction_keys(&table, true).unwrap();
        assert_eq!(keys.index(), &["m1", "m2", "m3"]);
        assert_eq!(keys.keys()[2].final_receiver, "bankD");
        assert_eq!(keys.keys()[2].account, "acct2");
        assert_eq!(keys.labels(), Some(&[0, 0, 1][..]));
        assert_eq!(transaction_keys(&table, false).unwrap().labels(), None);
    }

    #[test]
    fn test_missing_labels() {
        let csv = "MessageId,Timestamp,UETR,Receiver,BeneficiaryAccount\n\
                   m1,t1,u1,bankB,acct1\n\
                   m2,t2,u2,bankC,acct2\n";
        let table = TransactionTable::from_reader(csv.as_bytes()).unwrap();
        assert!(matches!(
            transaction_keys(&table, true),
            Err(DataError::MissingLabel(id)) if id == "m1"
        ));
        assert_eq!(transaction_keys(&table, false).unwrap().len(), 2);
    }

    #[test]
    fn test_left_join() {
        let table = TransactionTable::from_reader(SWIFT_CSV.as_bytes()).unwrap();
        let flags = FlagTable::from_reader(BANK_CSV.as_bytes()).unwrap();
        let keys = transaction_keys(&table, false).unwrap();
        let joined = join_flags(keys.keys(), &flags);
        // every row exactly once, in order; m3 goes to bankD/acct2 which has no flag row
        assert_eq!(
            joined,
            vec![Some("0".to_string()), Some("0".to_string()), None]
        );
    }

    #[test]
    fn test_join_first_duplicate_wins() {
        let flags = FlagTable::new(vec![
            AccountFlag {
                bank: "b".into(),
                account: "a".into(),
                flags: Some("3".into()),
            },
            AccountFlag {
                bank: "b".into(),
                account: "a".into(),
                flags: Some("5".into()),
            },
        ]);
        let key = JoinKey {
            final_receiver: "b".into(),
            account: "a".into(),
        };
        assert_eq!(join_flags(&[key], &flags), vec![Some("3".to_string())]);
    }
}
