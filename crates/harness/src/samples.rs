//! Small detached graphs shared by the scenario suites.

use scimeta_core::{
    DataContainer, DataProducer, Device, Keyword, Person, RecordDescription, RecordVariable,
    StandardUnit, DEPLOYMENT,
};

pub fn person(username: &str, email: &str) -> Person {
    Person {
        email: Some(email.into()),
        firstname: Some("Jo".into()),
        surname: Some("Doe".into()),
        ..Person::with_username(username)
    }
}

pub fn ctd(uuid: &str) -> Device {
    Device {
        name: Some("CTD".into()),
        mfg_name: Some("SeaBird".into()),
        mfg_model: Some("SBE-9".into()),
        ..Device::with_uuid(uuid)
    }
}

pub fn container(uri: &str) -> DataContainer {
    DataContainer {
        name: Some(uri.rsplit('/').next().unwrap_or(uri).to_string()),
        container_type: Some("File".into()),
        ..DataContainer::with_uri(uri)
    }
}

/// A deployment producing one container.
pub fn deployment(output_uri: &str) -> DataProducer {
    let mut producer = DataProducer::of_type(DEPLOYMENT);
    producer.add_output(container(output_uri));
    producer
}

/// A deployment with a device, an owner, an input and keywords.
pub fn full_deployment(name: &str, output_uri: &str) -> DataProducer {
    let mut producer = deployment(output_uri);
    producer.name = Some(name.into());
    producer.device = Some(Box::new(ctd("abc-123")));
    producer.person = Some(Box::new(person("jdoe", "jdoe@ssds.example.org")));
    producer.add_input(container("http://x/raw/input.log"));
    producer.keywords.push(Keyword::named("ctd"));
    producer.keywords.push(Keyword::named("monterey bay"));
    producer
}

/// A record description listing the given variables.
pub fn record_layout(names: &[&str]) -> RecordDescription {
    let mut layout = RecordDescription {
        endian: Some("little".into()),
        parseable: Some(true),
        ..RecordDescription::default()
    };
    for (index, name) in names.iter().enumerate() {
        layout.add_variable(RecordVariable {
            name: Some((*name).into()),
            column_index: Some(index as i64),
            standard_unit: Some(Box::new(StandardUnit {
                name: Some("degC".into()),
                ..StandardUnit::default()
            })),
            ..RecordVariable::default()
        });
    }
    layout
}
