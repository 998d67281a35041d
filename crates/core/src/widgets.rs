use serde::Serialize;

use crate::types::TransactionStatus;

/// Summary card a list page asks the runtime to render above its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderWidget {
    #[serde(rename = "transaksi-stats")]
    TransactionStats,
}

impl HeaderWidget {
    pub fn id(self) -> &'static str {
        match self {
            Self::TransactionStats => "transaksi-stats",
        }
    }
}

/// Aggregate row returned by the store: one per status present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTotals {
    pub status: TransactionStatus,
    pub count: u64,
    pub amount: i64,
}

/// Data behind the `transaksi-stats` widget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub total: u64,
    pub pending: u64,
    pub failed: u64,
    pub paid: u64,
    /// Sum of `total` over paid transactions, in rupiah.
    pub paid_revenue: i64,
}

impl TransactionStats {
    pub fn from_totals<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = StatusTotals>,
    {
        rows.into_iter().fold(Self::default(), |mut stats, row| {
            stats.total += row.count;
            match row.status {
                TransactionStatus::Pending => stats.pending += row.count,
                TransactionStatus::Failed => stats.failed += row.count,
                TransactionStatus::Paid => {
                    stats.paid += row.count;
                    stats.paid_revenue += row.amount;
                }
            }
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_fold_counts_and_paid_revenue() {
        let stats = TransactionStats::from_totals([
            StatusTotals {
                status: TransactionStatus::Pending,
                count: 2,
                amount: 30_000,
            },
            StatusTotals {
                status: TransactionStatus::Paid,
                count: 3,
                amount: 125_000,
            },
            StatusTotals {
                status: TransactionStatus::Failed,
                count: 1,
                amount: 9_000,
            },
        ]);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.paid, 3);
        assert_eq!(stats.paid_revenue, 125_000);
    }

    #[test]
    fn empty_store_yields_zeroes() {
        assert_eq!(
            TransactionStats::from_totals(Vec::new()),
            TransactionStats::default()
        );
    }

    #[test]
    fn widget_id_matches_serialized_name() {
        let value = serde_json::to_value(HeaderWidget::TransactionStats).expect("serialize");
        assert_eq!(value, serde_json::json!(HeaderWidget::TransactionStats.id()));
    }
}
