use scimeta_core::{
    DataContainer, DataProducer, Device, Event, Keyword, Person, Software,
    StandardVariable, Timestamp, PROCESS_RUN,
};
use scimeta_engine::{AmbiguousKeyPolicy, ChangeKind, EngineConfig, EngineError};
use scimeta_harness::{ADMIN, TestStore, samples};

fn suffix_is_well_formed(suffix: &str) -> bool {
    match suffix.split_once('_') {
        Some((millis, random)) => millis.parse::<i64>().is_ok() && random.parse::<u32>().is_ok(),
        None => false,
    }
}

// ============================================================================
// Device scenario
// ============================================================================

#[test]
fn device_name_generated_then_renamed() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;

    let first = store.engine.upsert(&Device::with_uuid("abc-123"))?;
    assert!(first.created);
    let stored: Device = store.engine.find_by_id(first.id, false)?.ok_or("device missing")?;
    assert_eq!(stored.uuid.as_deref(), Some("abc-123"));
    let name = stored.name.ok_or("name not generated")?;
    let suffix = name.strip_prefix("Device_").ok_or("wrong prefix")?;
    assert!(suffix_is_well_formed(suffix), "{name}");

    let renamed = store.engine.upsert(&Device {
        name: Some("CTD-1".into()),
        ..Device::with_uuid("abc-123")
    })?;
    assert_eq!(renamed.id, first.id);
    assert!(!renamed.created);
    assert!(renamed.changed);
    let stored: Device = store.engine.find_by_id(first.id, false)?.ok_or("device missing")?;
    assert_eq!(stored.name.as_deref(), Some("CTD-1"));

    let unrelated = store.engine.upsert(&Device::with_uuid("abc-123"))?;
    assert_eq!(unrelated.id, first.id);
    assert!(!unrelated.changed);
    assert_eq!(store.engine.count::<Device>()?, 1);

    Ok(())
}

#[test]
fn generated_key_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let outcome = store.engine.upsert(&Device::with_uuid("abc-123"))?;

    let generated = store.events_of(ChangeKind::KeyGenerated);
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].recipient, ADMIN);
    assert_eq!(generated[0].id, outcome.id);
    let after = generated[0].after.as_deref().ok_or("no summary")?;
    let prefix = format!("Device|id={}|name=Device_", outcome.id);
    assert!(after.starts_with(&prefix), "{after}");
    assert!(!after.contains("uuid="), "{after}");

    assert_eq!(store.events_of(ChangeKind::Created).len(), 1);
    Ok(())
}

#[test]
fn missing_uuid_gets_time_uuid() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let outcome = store.engine.upsert(&Device {
        name: Some("spare".into()),
        ..Device::default()
    })?;
    let stored: Device = store.engine.find_by_id(outcome.id, false)?.ok_or("device missing")?;
    let uuid = stored.uuid.ok_or("uuid not generated")?;
    assert_eq!(uuid.len(), 36);
    assert_eq!(stored.name.as_deref(), Some("spare"));
    Ok(())
}

// ============================================================================
// Idempotence and duplicate keys
// ============================================================================

#[test]
fn second_upsert_of_same_graph_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let producer = samples::full_deployment("cruise-42", "http://x/out/ctd.nc");

    let first = store.engine.upsert(&producer)?;
    assert!(first.created);
    let second = store.engine.upsert(&producer)?;
    assert_eq!(second.id, first.id);
    assert!(!second.created);
    assert!(!second.changed);

    assert_eq!(store.engine.count::<DataProducer>()?, 1);
    assert_eq!(store.engine.count::<DataContainer>()?, 2);
    assert_eq!(store.engine.count::<Keyword>()?, 2);
    assert_eq!(store.engine.count::<Device>()?, 1);
    assert_eq!(store.engine.count::<Person>()?, 1);
    Ok(())
}

#[test]
fn unchanged_upsert_sends_no_update() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    store.engine.upsert(&Keyword::named("ctd"))?;
    store.notifier.clear();

    store.engine.upsert(&Keyword::named("ctd"))?;
    assert!(store.events().is_empty());
    Ok(())
}

#[test]
fn distinct_objects_with_one_key_share_a_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;

    let a = store.engine.upsert(&Keyword::named("salinity"))?;
    let b = store.engine.upsert(&Keyword {
        description: Some("practical salinity".into()),
        ..Keyword::named("salinity")
    })?;
    assert_eq!(a.id, b.id);
    assert_eq!(store.engine.count::<Keyword>()?, 1);

    let software = |version: &str| Software {
        name: Some("ctd-proc".into()),
        software_version: Some(version.into()),
        ..Software::default()
    };
    let v1 = store.engine.upsert(&software("1.0"))?;
    let v1_again = store.engine.upsert(&software("1.0"))?;
    let v2 = store.engine.upsert(&software("2.0"))?;
    assert_eq!(v1.id, v1_again.id);
    assert_ne!(v1.id, v2.id);

    let variable = StandardVariable {
        name: Some("sea_water_temperature".into()),
        namespace_uri: Some("http://cf/".into()),
        ..StandardVariable::default()
    };
    let x = store.engine.upsert(&variable)?;
    let y = store.engine.upsert(&variable.clone())?;
    assert_eq!(x.id, y.id);

    let event = Event {
        name: Some("storm".into()),
        start_date: Some(Timestamp::from_millis(1_000)),
        end_date: Some(Timestamp::from_millis(2_000)),
        ..Event::default()
    };
    let first = store.engine.upsert(&event)?;
    let again = store.engine.upsert(&event)?;
    let later = store.engine.upsert(&Event {
        end_date: Some(Timestamp::from_millis(3_000)),
        ..event.clone()
    })?;
    assert_eq!(first.id, again.id);
    assert_ne!(first.id, later.id);
    Ok(())
}

#[test]
fn duplicates_inside_one_graph_collapse() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let mut producer = samples::deployment("http://x/1");
    producer.keywords.push(Keyword::named("ctd"));
    producer.keywords.push(Keyword::named("ctd"));
    producer.device = Some(Box::new(samples::ctd("abc-123")));
    producer.add_child(DataProducer {
        name: Some("sensor".into()),
        device: Some(Box::new(samples::ctd("abc-123"))),
        ..DataProducer::of_type(PROCESS_RUN)
    });

    let outcome = store.engine.upsert(&producer)?;
    assert_eq!(store.engine.count::<Keyword>()?, 1);
    assert_eq!(store.engine.count::<Device>()?, 1);
    assert_eq!(store.engine.related(outcome.id, DataProducer::KEYWORDS)?.len(), 1);
    Ok(())
}

#[test]
fn variable_without_namespace_is_not_duplicated() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let bare = StandardVariable {
        name: Some("temperature".into()),
        ..StandardVariable::default()
    };

    let a = store.engine.upsert(&bare)?;
    let b = store.engine.upsert(&bare)?;
    assert!(a.created);
    assert_eq!(a.id, b.id);
    assert_eq!(store.engine.count::<StandardVariable>()?, 1);

    let namespaced = store.engine.upsert(&StandardVariable {
        namespace_uri: Some("http://cf/".into()),
        ..bare.clone()
    })?;
    assert_ne!(namespaced.id, a.id);

    let again = store.engine.transaction(|session| {
        session.upsert(&bare)?;
        session.upsert(&bare)
    })?;
    assert_eq!(again.id, a.id);
    assert_eq!(store.engine.count::<StandardVariable>()?, 2);
    Ok(())
}

#[test]
fn producer_sharing_an_output_updates_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let p1 = store.engine.upsert(&samples::deployment("http://x/1"))?;

    let p2 = store.engine.upsert(&DataProducer {
        name: Some("mooring".into()),
        ..samples::deployment("http://x/1")
    })?;
    assert!(!p2.created);
    assert!(p2.changed);
    assert_eq!(p2.id, p1.id);
    assert_eq!(store.engine.count::<DataProducer>()?, 1);

    let stored: DataProducer = store.engine.find_by_id(p1.id, false)?.ok_or("missing")?;
    assert_eq!(stored.name.as_deref(), Some("mooring"));
    Ok(())
}

// ============================================================================
// Patch semantics
// ============================================================================

#[test]
fn absent_fields_never_erase() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let id = store.engine.upsert(&samples::ctd("abc-123"))?.id;

    let outcome = store.engine.upsert(&Device {
        mfg_serial_number: Some("0917".into()),
        ..Device::with_uuid("abc-123")
    })?;
    assert!(outcome.changed);

    let stored: Device = store.engine.find_by_id(id, false)?.ok_or("device missing")?;
    assert_eq!(stored.name.as_deref(), Some("CTD"));
    assert_eq!(stored.mfg_name.as_deref(), Some("SeaBird"));
    assert_eq!(stored.mfg_model.as_deref(), Some("SBE-9"));
    assert_eq!(stored.mfg_serial_number.as_deref(), Some("0917"));
    Ok(())
}

#[test]
fn upsert_by_id_cannot_move_business_key() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let id = store.engine.upsert(&samples::ctd("abc-123"))?.id;

    let mut moved = Device::with_uuid("def-456");
    moved.id = Some(id);
    moved.description = Some("moved".into());
    let outcome = store.engine.upsert(&moved)?;
    assert_eq!(outcome.id, id);

    let stored: Device = store.engine.find_by_id(id, false)?.ok_or("device missing")?;
    assert_eq!(stored.uuid.as_deref(), Some("abc-123"));
    assert_eq!(stored.description.as_deref(), Some("moved"));
    Ok(())
}

#[test]
fn stale_surrogate_id_falls_back_to_business_key() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let id = store.engine.upsert(&Keyword::named("ctd"))?.id;

    let mut stale = Keyword::named("ctd");
    stale.id = Some(scimeta_core::EntityId::from_raw(9_999));
    let outcome = store.engine.upsert(&stale)?;
    assert_eq!(outcome.id, id);
    assert!(!outcome.created);
    Ok(())
}

// ============================================================================
// People
// ============================================================================

#[test]
fn username_derived_from_email_then_names() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;

    let by_email = store.engine.upsert(&Person {
        email: Some("jane.roe@ssds.example.org".into()),
        ..Person::default()
    })?;
    let stored: Person = store.engine.find_by_id(by_email.id, false)?.ok_or("person missing")?;
    assert_eq!(stored.username.as_deref(), Some("jane.roe"));

    let by_name = store.engine.upsert(&Person {
        firstname: Some("Ed".into()),
        surname: Some("Ricketts".into()),
        ..Person::default()
    })?;
    let stored: Person = store.engine.find_by_id(by_name.id, false)?.ok_or("person missing")?;
    assert_eq!(stored.username.as_deref(), Some("EdRicketts"));
    Ok(())
}

#[test]
fn person_without_username_resolves_by_email() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let id = store.engine.upsert(&samples::person("jdoe", "jdoe@ssds.example.org"))?.id;

    let outcome = store.engine.upsert(&Person {
        email: Some("jdoe@ssds.example.org".into()),
        phone: Some("555-0100".into()),
        ..Person::default()
    })?;
    assert_eq!(outcome.id, id);
    assert!(outcome.changed);
    assert_eq!(store.engine.count::<Person>()?, 1);
    Ok(())
}

#[test]
fn ambiguous_email_takes_lowest_id_by_default() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let first = store.engine.upsert(&samples::person("a", "lab@ssds.example.org"))?.id;
    store.engine.upsert(&samples::person("b", "lab@ssds.example.org"))?;

    let outcome = store.engine.upsert(&Person {
        email: Some("lab@ssds.example.org".into()),
        ..Person::default()
    })?;
    assert_eq!(outcome.id, first);
    assert!(!outcome.created);
    Ok(())
}

#[test]
fn ambiguous_email_rejected_when_configured() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::with_config(EngineConfig {
        ambiguous_key_policy: AmbiguousKeyPolicy::Reject,
        ..EngineConfig::default()
    })?;
    store.engine.upsert(&samples::person("a", "lab@ssds.example.org"))?;
    store.engine.upsert(&samples::person("b", "lab@ssds.example.org"))?;

    let err = store
        .engine
        .upsert(&Person {
            email: Some("lab@ssds.example.org".into()),
            ..Person::default()
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::AmbiguousBusinessKey { matches: 2, .. }), "{err}");
    assert_eq!(store.engine.count::<Person>()?, 2);
    Ok(())
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn out_of_range_field_rejects_whole_entity() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let err = store
        .engine
        .upsert(&DataContainer {
            min_latitude: Some(91.0),
            name: Some("bad.nc".into()),
            ..DataContainer::with_uri("http://x/bad.nc")
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err}");
    assert_eq!(store.engine.count::<DataContainer>()?, 0);
    Ok(())
}

#[test]
fn invalid_choice_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let err = store.engine.upsert(&DataProducer::of_type("Cruise")).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err}");
    Ok(())
}

#[test]
fn invalid_related_entity_is_an_invalid_reference() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let mut producer = samples::deployment("http://x/1");
    producer.add_input(DataContainer {
        max_longitude: Some(400.0),
        ..DataContainer::with_uri("http://x/raw")
    });

    let err = store.engine.upsert(&producer).unwrap_err();
    assert!(
        matches!(err, EngineError::InvalidReference { relation: "inputs", .. }),
        "{err}"
    );
    // Nothing from the failed graph was committed.
    assert_eq!(store.engine.count::<DataProducer>()?, 0);
    assert_eq!(store.engine.count::<DataContainer>()?, 0);
    assert!(store.events().is_empty());
    Ok(())
}

#[test]
fn container_defaults_and_uri_generated() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let outcome = store.engine.upsert(&DataContainer {
        name: Some("anonymous.log".into()),
        ..DataContainer::default()
    })?;
    let stored: DataContainer = store.engine.find_by_id(outcome.id, false)?.ok_or("missing")?;
    assert_eq!(stored.container_type.as_deref(), Some("File"));
    let uri = stored.uri.ok_or("uri not generated")?;
    let suffix = uri
        .strip_prefix("http://ssds.mbari.org/dataFile/")
        .ok_or("unexpected uri")?;
    assert!(suffix_is_well_formed(suffix), "{uri}");
    assert_eq!(store.events_of(ChangeKind::KeyGenerated).len(), 2);
    Ok(())
}

#[test]
fn producer_type_and_name_default() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::new()?;
    let outcome = store.engine.upsert(&DataProducer::default())?;
    let stored: DataProducer = store.engine.find_by_id(outcome.id, false)?.ok_or("missing")?;
    assert_eq!(stored.producer_type.as_deref(), Some("Deployment"));
    assert!(stored.name.ok_or("name")?.starts_with("Deployment_"));
    // A producer with no outputs has no business key to match on.
    let other = store.engine.upsert(&DataProducer::default())?;
    assert_ne!(other.id, outcome.id);
    Ok(())
}
