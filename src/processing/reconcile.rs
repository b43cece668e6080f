//! Null repair: derive missing `quantity` / `total` from `total = price * quantity`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{RecordError, RejectCounts};
use crate::schema::{QUANTITY, RawRecord, ReconciledRecord};

/// Decimal places kept on a derived `total`.
pub const TOTAL_SCALE: u32 = 2;

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Surviving records, in input order.
    pub records: Vec<ReconciledRecord>,
    /// Discarded rows; `row` is the 1-based position in the input batch.
    pub rejected: Vec<RecordError>,
}

impl Reconciliation {
    pub fn reject_counts(&self) -> RejectCounts {
        RejectCounts::from_errors(&self.rejected)
    }
}

/// Repair a batch of raw records.
///
/// 1. Rows with `quantity`, `price` and `total` all null are discarded.
/// 2. A null `quantity` becomes `floor(total / price)`; a null `total` becomes
///    `round(price * quantity, 2)` (midpoint away from zero). Rows where the missing value cannot
///    be derived (null or zero price, or the other operand also null) are discarded.
/// 3. Rows with all three values present pass through untouched. Their consistency is not
///    checked.
///
/// A derived quantity too large for an integer is a `Cast` reject, like any other value that does
/// not fit its storage width.
///
/// Each record is handled independently; input order is preserved among survivors.
pub fn reconcile(batch: &[RawRecord]) -> Reconciliation {
    let mut out = Reconciliation {
        records: Vec::with_capacity(batch.len()),
        rejected: Vec::new(),
    };

    for (idx0, record) in batch.iter().enumerate() {
        let row = idx0 + 1;
        if record.is_unrecoverable() {
            out.rejected.push(RecordError::Unrecoverable { row });
            continue;
        }
        match reconcile_record(row, record) {
            Ok(r) => out.records.push(r),
            Err(e) => out.rejected.push(e),
        }
    }

    out
}

/// Derive the missing numeric field of a single record that survived the discard pass.
pub fn reconcile_record(row: usize, record: &RawRecord) -> Result<ReconciledRecord, RecordError> {
    let failure = |message: &str| RecordError::DerivationFailure {
        row,
        message: message.to_string(),
    };

    let (quantity, total) = match (record.quantity, record.total) {
        (None, total) => {
            let price = nonzero_price(record.price)
                .ok_or_else(|| failure("quantity is null and price is null or zero"))?;
            let total = total.ok_or_else(|| failure("quantity and total are both null"))?;
            let quantity = derive_quantity(price, total).ok_or_else(|| RecordError::Cast {
                row,
                column: QUANTITY.to_string(),
                message: format!("derived quantity {total} / {price} does not fit in a 64-bit integer"),
            })?;
            (quantity, total)
        }
        (Some(quantity), None) => {
            let price = record
                .price
                .ok_or_else(|| failure("total is null and price is null"))?;
            let total = derive_total(price, quantity)
                .ok_or_else(|| failure("derived total overflows"))?;
            (quantity, total)
        }
        (Some(quantity), Some(total)) => (quantity, total),
    };

    Ok(ReconciledRecord {
        product: record.product.clone(),
        price: record.price,
        quantity,
        total,
        ordered_at: record.ordered_at,
        delivery_at: record.delivery_at,
    })
}

fn nonzero_price(price: Option<Decimal>) -> Option<Decimal> {
    price.filter(|p| !p.is_zero())
}

/// `floor(total / price)`; `None` on division overflow or when the result exceeds `i64`.
pub fn derive_quantity(price: Decimal, total: Decimal) -> Option<i64> {
    total.checked_div(price)?.floor().to_i64()
}

/// `round(price * quantity, 2)`, half-up; `None` on overflow.
pub fn derive_total(price: Decimal, quantity: i64) -> Option<Decimal> {
    let product = price.checked_mul(Decimal::from(quantity))?;
    Some(product.round_dp_with_strategy(TOTAL_SCALE, RoundingStrategy::MidpointAwayFromZero))
}
