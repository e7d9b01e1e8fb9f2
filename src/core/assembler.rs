use crate::core::table::MunicipalityTable;
use crate::domain::model::{MunicipalityPricing, PriceEntry, PricingDocument, RegionPricing};
use std::collections::BTreeMap;

/// Builds the pricing document from a fully interpolated table.
///
/// Every row contributes one entry per catalog service; the table is not
/// modified, so assembling twice yields equal documents.
pub fn assemble(table: &MunicipalityTable) -> PricingDocument {
    let catalog = table.catalog();
    let mut regions: BTreeMap<String, RegionPricing> = BTreeMap::new();

    for (_, row) in table.rows() {
        let services = catalog
            .iter()
            .map(|(id, name)| (name.to_string(), PriceEntry::from(*row.cell(id))))
            .collect();

        regions
            .entry(row.key.region.clone())
            .or_default()
            .insert(row.key.city.clone(), MunicipalityPricing { services });
    }

    PricingDocument::new(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::MunicipalityKey;
    use crate::domain::services::ServiceCatalog;

    #[test]
    fn test_every_row_and_service_present() {
        let mut table = MunicipalityTable::from_rows(
            ServiceCatalog::new(["A", "B"]).unwrap(),
            vec![
                (MunicipalityKey::new("X", "R1"), vec![Some(100.0), None]),
                (MunicipalityKey::new("Y", "R1"), vec![None, None]),
                (MunicipalityKey::new("Z", "R2"), vec![Some(1.0), Some(2.0)]),
            ],
        )
        .unwrap();
        let x = table.row_id(&MunicipalityKey::new("X", "R1")).unwrap();
        let b = table.catalog().id_of("B").unwrap();
        table.fill_interpolated(x, b, 55.0);

        let doc = assemble(&table);
        assert_eq!(doc.municipality_count(), 3);
        assert_eq!(doc.regions().len(), 2);

        let x = doc.get("R1", "X").unwrap();
        assert_eq!(
            x.get("A"),
            Some(&PriceEntry {
                price: Some(100.0),
                interpolation_used: false
            })
        );
        assert_eq!(
            x.get("B"),
            Some(&PriceEntry {
                price: Some(55.0),
                interpolation_used: true
            })
        );

        let y = doc.get("R1", "Y").unwrap();
        assert_eq!(y.services.len(), 2);
        assert_eq!(
            y.get("A"),
            Some(&PriceEntry {
                price: None,
                interpolation_used: false
            })
        );
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let table = MunicipalityTable::from_rows(
            ServiceCatalog::reference(),
            vec![(MunicipalityKey::new("Austin", "TX"), vec![Some(250.0); 10])],
        )
        .unwrap();
        assert_eq!(assemble(&table), assemble(&table));

        let document = assemble(&table);
        let names: Vec<&str> = document
            .get("TX", "Austin")
            .unwrap()
            .services
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, crate::domain::services::REFERENCE_SERVICES.to_vec());
    }
}
