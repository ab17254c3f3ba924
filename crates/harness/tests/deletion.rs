use scimeta_core::{
    DataContainer, DataProducer, Device, HeaderDescription, Keyword, Person, RecordDescription,
    RecordVariable, StandardUnit,
};
use scimeta_engine::ChangeKind;
use scimeta_harness::{TestStore, samples};

// ============================================================================
// Shared references are severed first
// ============================================================================

#[test]
fn deleting_shared_device_nulls_every_producer() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let mut producers = Vec::new();
    for n in 0..5 {
        let mut producer = samples::deployment(&format!("http://x/{n}.nc"));
        producer.device = Some(Box::new(samples::ctd("abc-123")));
        producers.push(store.engine.upsert(&producer)?.id);
    }
    let device = store
        .engine
        .find_by_business_key(&Device::with_uuid("abc-123"), false)?
        .and_then(|d| d.id)
        .ok_or("device missing")?;
    assert_eq!(store.engine.find_referencing(DataProducer::DEVICE, device)?.len(), 5);

    assert!(store.engine.delete(&Device::with_uuid("abc-123"))?);

    assert_eq!(store.engine.count::<Device>()?, 0);
    assert_eq!(store.engine.count::<DataProducer>()?, 5);
    for id in producers {
        assert!(store.engine.related(id, DataProducer::DEVICE)?.is_empty());
    }
    Ok(())
}

#[test]
fn deleting_keyword_removes_memberships() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let producer = store.engine.upsert(&samples::full_deployment("a", "http://x/a.nc"))?.id;
    let mut container = samples::container("http://x/b.nc");
    container.keywords.push(Keyword::named("ctd"));
    let container = store.engine.upsert(&container)?.id;

    assert!(store.engine.delete(&Keyword::named("ctd"))?);

    let remaining = store.engine.related(producer, DataProducer::KEYWORDS)?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name.as_deref(), Some("monterey bay"));
    assert!(store.engine.related(container, DataContainer::KEYWORDS)?.is_empty());
    Ok(())
}

#[test]
fn deleting_person_clears_owner_everywhere() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let producer = store.engine.upsert(&samples::full_deployment("a", "http://x/a.nc"))?.id;
    let device = store
        .engine
        .upsert(&Device {
            person: Some(Box::new(Person::with_username("jdoe"))),
            ..Device::with_uuid("abc-123")
        })?
        .id;

    assert!(store.engine.delete(&Person::with_username("jdoe"))?);
    assert!(store.engine.related(producer, DataProducer::PERSON)?.is_empty());
    assert!(store.engine.related(device, Device::PERSON)?.is_empty());
    Ok(())
}

// ============================================================================
// Owned and self-referential collections
// ============================================================================

#[test]
fn deleting_description_deletes_its_variables() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let layout = store.engine.upsert(&samples::record_layout(&["temp", "cond", "pres"]))?.id;
    let container = store
        .engine
        .upsert(&DataContainer {
            record_description: Some(Box::new(RecordDescription {
                id: Some(layout),
                ..RecordDescription::default()
            })),
            ..samples::container("http://x/a.nc")
        })?
        .id;

    let target = RecordDescription {
        id: Some(layout),
        ..RecordDescription::default()
    };
    assert!(store.engine.delete(&target)?);

    assert_eq!(store.engine.count::<RecordDescription>()?, 0);
    assert_eq!(store.engine.count::<RecordVariable>()?, 0);
    // Vocabulary terms are shared, not owned.
    assert_eq!(store.engine.count::<StandardUnit>()?, 1);
    assert!(store.engine.related(container, DataContainer::RECORD_DESCRIPTION)?.is_empty());
    Ok(())
}

#[test]
fn deleting_container_deletes_its_descriptions() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let container = store.engine.upsert(&DataContainer {
        header_description: Some(Box::new(HeaderDescription {
            description: Some("seabird header".into()),
            num_header_lines: Some(12),
            ..HeaderDescription::default()
        })),
        record_description: Some(Box::new(samples::record_layout(&["temp", "cond"]))),
        ..samples::container("http://x/a.nc")
    })?;
    assert_eq!(store.engine.count::<HeaderDescription>()?, 1);
    assert_eq!(store.engine.count::<RecordVariable>()?, 2);
    store.notifier.clear();

    assert!(store.engine.delete(&DataContainer::with_uri("http://x/a.nc"))?);

    assert_eq!(store.engine.count::<DataContainer>()?, 0);
    assert_eq!(store.engine.count::<HeaderDescription>()?, 0);
    assert_eq!(store.engine.count::<RecordDescription>()?, 0);
    assert_eq!(store.engine.count::<RecordVariable>()?, 0);
    assert_eq!(store.engine.count::<StandardUnit>()?, 1);

    let deleted = store.events_of(ChangeKind::Deleted);
    assert_eq!(deleted[0].id, container.id);
    assert_eq!(deleted.len(), 5);
    Ok(())
}

#[test]
fn deleting_producer_orphans_outputs_and_children() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let mut parent = samples::full_deployment("mooring", "http://x/mooring.nc");
    parent.add_child(samples::deployment("http://x/ctd.nc"));
    let parent_id = store.engine.upsert(&parent)?.id;

    let child = store
        .engine
        .related(parent_id, DataProducer::CHILDREN)?
        .pop()
        .and_then(|c| c.id)
        .ok_or("child missing")?;
    let input = store
        .engine
        .find_by_business_key(&DataContainer::with_uri("http://x/raw/input.log"), false)?
        .and_then(|c| c.id)
        .ok_or("input missing")?;

    assert!(store.engine.delete(&samples::deployment("http://x/mooring.nc"))?);

    assert_eq!(store.engine.count::<DataProducer>()?, 1);
    assert!(store.engine.related(child, DataProducer::PARENT)?.is_empty());
    assert!(store.engine.related(input, DataContainer::CONSUMERS)?.is_empty());
    let output = store
        .engine
        .find_by_business_key(&DataContainer::with_uri("http://x/mooring.nc"), false)?
        .and_then(|c| c.id)
        .ok_or("output deleted with its creator")?;
    assert!(store.engine.related(output, DataContainer::CREATOR)?.is_empty());
    Ok(())
}

// ============================================================================
// Idempotence and notifications
// ============================================================================

#[test]
fn deleting_twice_reports_nothing_to_delete() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    store.engine.upsert(&Keyword::named("ctd"))?;

    assert!(store.engine.delete(&Keyword::named("ctd"))?);
    assert!(!store.engine.delete(&Keyword::named("ctd"))?);
    assert!(!store.engine.delete(&Keyword::named("never stored"))?);
    Ok(())
}

#[test]
fn delete_notifies_with_before_summary() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let id = store.engine.upsert(&Keyword::named("ctd"))?.id;
    store.notifier.clear();

    store.engine.delete(&Keyword::named("ctd"))?;
    let deleted = store.events_of(ChangeKind::Deleted);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, id);
    assert_eq!(deleted[0].before.as_deref(), Some(format!("Keyword|id={id}|name=ctd").as_str()));
    assert!(deleted[0].after.is_none());
    Ok(())
}
