//! Gross receipts tax and sales tax, applied as the last step of a bill.

use tariff_client::domain::TaxTable;

use crate::bill::{Bill, TaxApplied};

/// Tax rates are applied only when strictly positive.
fn effective_rate(rate: f64) -> f64 {
    if rate > 0.0 {
        rate
    } else {
        0.0
    }
}

/// GRT first, then sales tax on the GRT-inclusive amount.
pub fn apply_grt_sales_tax(total: f64, grt_rate: f64, sales_tax_rate: f64) -> f64 {
    let with_grt = total * (1.0 + effective_rate(grt_rate));
    with_grt * (1.0 + effective_rate(sales_tax_rate))
}

/// Tax the bill using the row keyed exactly by its account and window. A bill
/// without a row passes through untouched.
pub fn apply_tax(bill: Bill, taxes: &TaxTable) -> Bill {
    let Some(row) = taxes.find(bill.account_id, bill.date_from, bill.date_to) else {
        tracing::debug!(
            account_id = bill.account_id,
            date_from = %bill.date_from,
            date_to = %bill.date_to,
            "no tax row for bill"
        );
        metrics::counter!("tax_rows_missing_total").increment(1);
        return bill;
    };

    let grt_rate = effective_rate(row.grt_rate);
    let sales_tax_rate = effective_rate(row.sales_tax_fraction());
    let pre_tax_total = bill.total;

    Bill {
        total: apply_grt_sales_tax(pre_tax_total, grt_rate, sales_tax_rate),
        tax: Some(TaxApplied {
            pre_tax_total,
            grt_rate,
            sales_tax_rate,
        }),
        ..bill
    }
}
