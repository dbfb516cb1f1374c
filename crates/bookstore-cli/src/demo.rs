// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use bookstore_app::{FieldKey, FormMode, SaveOptions, SaveOutcome};
use bookstore_db::{LockPolicy, Store};
use bookstore_testkit::{BookstoreFaker, CatalogSize};
use tracing::info;

const DEMO_SEED: u64 = 1987;

/// Fills an empty store with a deterministic fake catalog. Dates are written in the
/// store's date format.
pub fn seed_demo_data(store: &Store) -> Result<usize> {
    let catalog = BookstoreFaker::new(DEMO_SEED)
        .with_date_format(store.date_format())
        .catalog(CatalogSize::default());

    let mut session = store.begin_exclusive(LockPolicy::default(), |_| {})?;
    let mut saved = 0;
    for record in catalog.records() {
        match session.save(FormMode::Create, record, None, SaveOptions::default())? {
            SaveOutcome::Saved { .. } => saved += 1,
            other => bail!(
                "demo {} {} was not saved: {other:?}",
                record.entity.table(),
                record.get(FieldKey::Numeral)
            ),
        }
    }
    session.commit()?;
    info!(records = saved, "demo data seeded");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::seed_demo_data;
    use anyhow::Result;
    use bookstore_app::{DateFormat, DateOrder, Entity};
    use bookstore_db::Store;

    #[test]
    fn demo_catalog_fills_every_table() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let saved = seed_demo_data(&store)?;
        assert!(saved > 0);
        for entity in Entity::ALL {
            assert!(store.count_rows(entity)? > 0, "{} is empty", entity.table());
        }
        Ok(())
    }

    #[test]
    fn demo_catalog_follows_store_date_format() -> Result<()> {
        let mut store = Store::open_memory()?;
        store.bootstrap()?;
        store.set_date_format(DateFormat::new(DateOrder::MonthDay, '-', true));
        seed_demo_data(&store)?;
        assert!(store.count_rows(Entity::Book)? > 0);
        Ok(())
    }
}
