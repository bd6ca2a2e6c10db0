use crate::instrument::NormalizedInstrument;
use crate::reconcile::Reconciliation;

/// Rows projected onto a fixed, ordered column set. `None` is an empty cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn project<'a, I>(columns: &[String], instruments: I) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedInstrument>,
    {
        let rows = instruments
            .into_iter()
            .map(|instrument| {
                columns
                    .iter()
                    .map(|column| instrument.field(column).map(str::to_string))
                    .collect()
            })
            .collect();
        Self {
            columns: columns.to_vec(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One table per partition, all sharing the same header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportTables {
    pub common: Table,
    pub only_left: Table,
    pub only_right: Table,
}

/// Project every partition onto `columns`. Common rows use the merged record.
pub fn emit(reconciliation: &Reconciliation, columns: &[String]) -> ReportTables {
    ReportTables {
        common: Table::project(
            columns,
            reconciliation.common.iter().map(|pair| &pair.merged),
        ),
        only_left: Table::project(columns, &reconciliation.only_left),
        only_right: Table::project(columns, &reconciliation.only_right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{SourceKind, DEFAULT_OUTPUT_COLUMNS};
    use crate::reconcile::reconcile;

    fn columns() -> Vec<String> {
        DEFAULT_OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn instrument(symbol: &str, source: SourceKind) -> NormalizedInstrument {
        NormalizedInstrument {
            exchange: "NSE".into(),
            trading_symbol: symbol.into(),
            instrument_key: None,
            symbol_name: Some(format!("{symbol} Ltd")),
            security_id: None,
            short_name: Some(symbol.into()),
            name: Some(format!("{symbol} Ltd")),
            isin: None,
            source,
        }
    }

    #[test]
    fn every_table_shares_the_header() {
        let result = reconcile(
            vec![instrument("A", SourceKind::Upstox), instrument("B", SourceKind::Upstox)],
            vec![instrument("B", SourceKind::Dhan), instrument("C", SourceKind::Dhan)],
        );
        let tables = emit(&result, &columns());
        for table in [&tables.common, &tables.only_left, &tables.only_right] {
            assert_eq!(table.columns, columns());
            assert_eq!(table.len(), 1);
            assert_eq!(table.rows[0].len(), columns().len());
        }
        assert_eq!(tables.only_left.rows[0][7].as_deref(), Some("A"));
        assert_eq!(tables.only_right.rows[0][7].as_deref(), Some("C"));
    }

    #[test]
    fn missing_fields_render_as_empty_cells() {
        let mut with_key = instrument("INFY", SourceKind::Upstox);
        with_key.instrument_key = Some("NSE_EQ|INE009A01021".into());
        with_key.isin = Some("INE009A01021".into());
        let mut right = instrument("INFY", SourceKind::Dhan);
        right.security_id = Some("1594".into());
        let tables = emit(&reconcile(vec![with_key], vec![right]), &columns());
        assert_eq!(
            tables.common.rows[0],
            vec![
                Some("NSE".to_string()),
                Some("NSE_EQ|INE009A01021".to_string()),
                Some("INFY Ltd".to_string()),
                Some("1594".to_string()),
                Some("INFY".to_string()),
                Some("INFY Ltd".to_string()),
                Some("INE009A01021".to_string()),
                Some("INFY".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_columns_are_kept_empty() {
        let cols = vec!["trading_symbol".to_string(), "lot_size".to_string()];
        let tables = emit(&reconcile(vec![instrument("X", SourceKind::Upstox)], vec![]), &cols);
        assert_eq!(tables.only_left.columns, cols);
        assert_eq!(tables.only_left.rows, vec![vec![Some("X".to_string()), None]]);
        assert!(tables.common.is_empty());
    }
}
