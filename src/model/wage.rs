use serde::{Deserialize, Serialize};

/// One sub-record (per-employee line) value as read off an entry page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRecordValue {
    pub id: String,
    pub value: f64,
}

/// A sub-record that sits below the wage floor, with the shortfall the edit
/// pass must make up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAdjustment {
    pub sub_id: String,
    pub value: f64,
    pub shortfall: f64,
}

/// The computed correction for one employer: raise every sub-record value
/// below the floor up to the floor and re-aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WageAdjustment {
    pub employer_number: String,
    pub current_amount: f64,
    pub adjusted_amount: f64,
    pub affected: Vec<SubAdjustment>,
}

/// Evaluate the per-unit minimum rule over an employer's sub-records.
///
/// Returns `None` when every value meets the floor — in that case the
/// adjusted aggregate would equal the original and no adjustment item is
/// created. Otherwise the adjusted aggregate is `Σ max(value, floor)`.
pub fn evaluate_wage_floor(
    employer_number: &str,
    subs: &[SubRecordValue],
    floor: f64,
) -> Option<WageAdjustment> {
    let affected: Vec<SubAdjustment> = subs
        .iter()
        .filter(|s| s.value < floor)
        .map(|s| SubAdjustment {
            sub_id: s.id.clone(),
            value: s.value,
            shortfall: floor - s.value,
        })
        .collect();

    if affected.is_empty() {
        return None;
    }

    let current_amount = subs.iter().map(|s| s.value).sum();
    let adjusted_amount = subs.iter().map(|s| s.value.max(floor)).sum();

    Some(WageAdjustment {
        employer_number: employer_number.to_string(),
        current_amount,
        adjusted_amount,
        affected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: f64 = 79.35;

    fn sub(id: &str, value: f64) -> SubRecordValue {
        SubRecordValue {
            id: id.into(),
            value,
        }
    }

    #[test]
    fn no_adjustment_when_all_meet_floor() {
        let subs = vec![sub("a", 80.0), sub("b", 79.35), sub("c", 120.0)];
        assert!(evaluate_wage_floor("123456789", &subs, FLOOR).is_none());
    }

    #[test]
    fn adjusted_aggregate_is_sum_of_max() {
        let subs = vec![sub("a", 40.0), sub("b", 100.0)];
        let adj = evaluate_wage_floor("123456789", &subs, FLOOR).unwrap();

        assert_eq!(adj.current_amount, 140.0);
        assert!((adj.adjusted_amount - (79.35 + 100.0)).abs() < 1e-9);
        assert_eq!(adj.affected.len(), 1);
        assert_eq!(adj.affected[0].sub_id, "a");
        assert!((adj.affected[0].shortfall - 39.35).abs() < 1e-9);
    }

    #[test]
    fn every_below_floor_value_is_listed() {
        let subs = vec![sub("a", 10.0), sub("b", 20.0), sub("c", 79.36)];
        let adj = evaluate_wage_floor("123456789", &subs, FLOOR).unwrap();
        assert_eq!(adj.affected.len(), 2);
        assert!((adj.adjusted_amount - (79.35 * 2.0 + 79.36)).abs() < 1e-9);
    }

    #[test]
    fn value_exactly_at_floor_is_not_affected() {
        let subs = vec![sub("a", 79.35)];
        assert!(evaluate_wage_floor("123456789", &subs, FLOOR).is_none());
    }

    #[test]
    fn empty_sub_records_need_no_adjustment() {
        assert!(evaluate_wage_floor("123456789", &[], FLOOR).is_none());
    }
}
