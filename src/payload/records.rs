//! Typed record sets exchanged between the coordinator and the clients.

use std::{
    collections::{BTreeSet, HashSet},
    iter::FromIterator,
};

use super::{Parameters, PayloadError, Tensor};
use crate::{common::Label, data::JoinKey, model::Scores};

const KEY_COLUMNS: usize = 2;

/// Transactions reduced to their index, their join keys and optionally their labels.
///
/// Encoded as `[index, values]` where `values` is a matrix with the columns
/// `FinalReceiver`, `BeneficiaryAccount` and, for labelled transactions, `Label`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionKeys {
    index: Vec<String>,
    keys: Vec<JoinKey>,
    labels: Option<Vec<Label>>,
}

impl TransactionKeys {
    /// Creates a new record set.
    ///
    /// # Errors
    /// Fails if the index and the rows have different lengths or if the index has duplicates.
    pub fn new(
        index: Vec<String>,
        keys: Vec<JoinKey>,
        labels: Option<Vec<Label>>,
    ) -> Result<Self, PayloadError> {
        check_lengths(index.len(), keys.len())?;
        if let Some(labels) = &labels {
            check_lengths(index.len(), labels.len())?;
        }
        check_unique(&index)?;
        Ok(Self {
            index,
            keys,
            labels,
        })
    }

    /// Creates a record set from columns of a table whose index is already unique.
    pub(crate) fn from_table_parts(
        index: Vec<String>,
        keys: Vec<JoinKey>,
        labels: Option<Vec<Label>>,
    ) -> Self {
        debug_assert_eq!(index.len(), keys.len());
        Self {
            index,
            keys,
            labels,
        }
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn keys(&self) -> &[JoinKey] {
        &self.keys
    }

    pub fn labels(&self) -> Option<&[Label]> {
        self.labels.as_deref()
    }

    pub fn is_labelled(&self) -> bool {
        self.labels.is_some()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Keeps the records whose final receiver is a member of the given set.
    pub fn retain_members(&self, members: &Membership) -> Self {
        let keep: Vec<bool> = self
            .keys
            .iter()
            .map(|key| members.contains(&key.final_receiver))
            .collect();
        Self {
            index: select(&self.index, &keep),
            keys: select(&self.keys, &keep),
            labels: self.labels.as_deref().map(|labels| select(labels, &keep)),
        }
    }

    pub fn to_parameters(&self) -> Result<Parameters, PayloadError> {
        let columns = if self.is_labelled() {
            KEY_COLUMNS + 1
        } else {
            KEY_COLUMNS
        };
        let mut values = Vec::with_capacity(self.len() * columns);
        for (row, key) in self.keys.iter().enumerate() {
            values.push(key.final_receiver.clone());
            values.push(key.account.clone());
            if let Some(labels) = &self.labels {
                values.push(labels[row].to_string());
            }
        }
        Ok(Parameters::new(vec![
            Tensor::from_strings(vec![self.len()], &self.index)?,
            Tensor::from_strings(vec![self.len(), columns], &values)?,
        ]))
    }

    /// Decodes a record set, expecting a label column iff `labelled`.
    pub fn from_parameters(params: &Parameters, labelled: bool) -> Result<Self, PayloadError> {
        let [index, values] = params.blocks::<2>()?;
        let index = index.to_strings()?;
        let values = values.to_string_matrix()?;
        let expected = if labelled { KEY_COLUMNS + 1 } else { KEY_COLUMNS };
        if values.ncols() != expected {
            return Err(PayloadError::ColumnCount {
                expected,
                found: values.ncols(),
            });
        }

        let mut keys = Vec::with_capacity(values.nrows());
        let mut labels = Vec::with_capacity(if labelled { values.nrows() } else { 0 });
        for row in values.rows() {
            keys.push(JoinKey {
                final_receiver: row[0].clone(),
                account: row[1].clone(),
            });
            if labelled {
                labels.push(parse_label(&row[2])?);
            }
        }
        Self::new(index, keys, if labelled { Some(labels) } else { None })
    }
}

fn select<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(value, _)| value.clone())
        .collect()
}

fn parse_label(value: &str) -> Result<Label, PayloadError> {
    value
        .parse()
        .map_err(|_| PayloadError::InvalidLabel(value.to_string()))
}

/// The banks a partition client holds data for.
///
/// Encoded as `[banks]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership(BTreeSet<String>);

impl Membership {
    pub fn contains(&self, bank: &str) -> bool {
        self.0.contains(bank)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn to_parameters(&self) -> Result<Parameters, PayloadError> {
        let banks: Vec<&str> = self.0.iter().map(String::as_str).collect();
        Ok(Parameters::new(vec![Tensor::from_strings(
            vec![banks.len()],
            &banks,
        )?]))
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, PayloadError> {
        let [banks] = params.blocks::<1>()?;
        Ok(banks.to_strings()?.into_iter().collect())
    }
}

impl FromIterator<String> for Membership {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Scores are encoded as `[index, values]`, with `f64` values.
impl Scores {
    pub fn to_parameters(&self) -> Result<Parameters, PayloadError> {
        Ok(Parameters::new(vec![
            Tensor::from_strings(vec![self.len()], self.index())?,
            Tensor::from_f64(self.values().to_vec()),
        ]))
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, PayloadError> {
        let [index, values] = params.blocks::<2>()?;
        let index = index.to_strings()?;
        let values = values.to_f64()?.to_vec();
        check_lengths(index.len(), values.len())?;
        check_unique(&index)?;
        Ok(Scores::from_parts(index, values))
    }
}

fn check_lengths(index: usize, rows: usize) -> Result<(), PayloadError> {
    if index == rows {
        Ok(())
    } else {
        Err(PayloadError::LengthMismatch { index, rows })
    }
}

fn check_unique(index: &[String]) -> Result<(), PayloadError> {
    let mut seen = HashSet::with_capacity(index.len());
    match index.iter().find(|id| !seen.insert(id.as_str())) {
        Some(duplicate) => Err(PayloadError::DuplicateIndex(duplicate.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(receiver: &str, account: &str) -> JoinKey {
        JoinKey {
            final_receiver: receiver.to_string(),
            account: account.to_string(),
        }
    }

    fn labelled_keys() -> TransactionKeys {
        TransactionKeys::new(
            vec!["m1".into(), "m2".into(), "m3".into()],
            vec![key("bankX", "acct1"), key("bankY", "acct2"), key("bankX", "acct3")],
            Some(vec![1, 0, 0]),
        )
        .unwrap()
    }

    #[test]
    fn test_transaction_keys_round_trip() {
        let records = labelled_keys();
        let params = records.to_parameters().unwrap();
        assert_eq!(params.tensors()[1].shape(), &[3, 3]);
        let decoded = TransactionKeys::from_parameters(&params, true).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_label_column_is_checked() {
        let params = labelled_keys().to_parameters().unwrap();
        assert!(matches!(
            TransactionKeys::from_parameters(&params, false),
            Err(PayloadError::ColumnCount {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn test_invariants() {
        assert!(matches!(
            TransactionKeys::new(vec!["m1".into()], vec![], None),
            Err(PayloadError::LengthMismatch { index: 1, rows: 0 })
        ));
        assert!(matches!(
            TransactionKeys::new(
                vec!["m1".into(), "m1".into()],
                vec![key("a", "b"), key("a", "c")],
                None
            ),
            Err(PayloadError::DuplicateIndex(id)) if id == "m1"
        ));
    }

    #[test]
    fn test_retain_members() {
        let members: Membership = vec!["bankX".to_string()].into_iter().collect();
        let kept = labelled_keys().retain_members(&members);
        assert_eq!(kept.index(), &["m1", "m3"]);
        assert_eq!(kept.labels(), Some(&[1, 0][..]));

        let empty = kept.retain_members(&Membership::default());
        assert!(empty.is_empty());
        let params = empty.to_parameters().unwrap();
        assert_eq!(params.tensors()[1].shape(), &[0, 3]);
        assert!(TransactionKeys::from_parameters(&params, true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_membership_round_trip() {
        let members: Membership = vec!["b2".to_string(), "b1".to_string(), "b2".to_string()]
            .into_iter()
            .collect();
        assert_eq!(members.len(), 2);
        let decoded = Membership::from_parameters(&members.to_parameters().unwrap()).unwrap();
        assert_eq!(decoded, members);
    }

    #[test]
    fn test_scores_round_trip() {
        let scores = Scores::from_parts(vec!["m1".into(), "m2".into()], vec![0.25, 1.0]);
        let decoded = Scores::from_parameters(&scores.to_parameters().unwrap()).unwrap();
        assert_eq!(decoded, scores);
        assert!(Scores::from_parameters(&Parameters::empty()).is_err());
    }
}
