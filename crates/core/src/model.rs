//! Detached entity types. Field and relation names match the catalog
//! exactly; `to_node`/`from_node` rely on it.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Rel, Related};
use crate::field_value::{Scalar, Timestamp};
use crate::ids::EntityId;
use crate::node::Node;
use crate::schema::EntityKind;

macro_rules! entity {
    (
        $(#[$meta:meta])*
        $name:ident {
            fields { $($field:ident : $fty:ty),* $(,)? }
            one { $($one:ident [$one_const:ident] : $one_ty:ident),* $(,)? }
            many { $($many:ident [$many_const:ident] : $many_ty:ident),* $(,)? }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            pub id: Option<EntityId>,
            pub version: Option<i64>,
            $(pub $field: Option<$fty>,)*
            $(pub $one: Option<Box<$one_ty>>,)*
            $(pub $many: Related<$many_ty>,)*
        }

        impl $name {
            $(pub const $one_const: Rel<$name, $one_ty> = Rel::new(stringify!($one));)*
            $(pub const $many_const: Rel<$name, $many_ty> = Rel::new(stringify!($many));)*
        }

        impl Entity for $name {
            const KIND: EntityKind = EntityKind::$name;

            fn id(&self) -> Option<EntityId> {
                self.id
            }

            fn to_node(&self) -> Node {
                let mut node = Node::new(Self::KIND);
                node.id = self.id;
                node.version = self.version;
                $(
                    if let Some(value) = &self.$field {
                        node.fields.insert(stringify!($field), Scalar::into_value(value.clone()));
                    }
                )*
                $(
                    if let Some(target) = &self.$one {
                        node.one.insert(stringify!($one), Box::new(target.to_node()));
                    }
                )*
                $(
                    if let Some(items) = self.$many.as_slice() {
                        let nodes = items.iter().map(Entity::to_node).collect();
                        node.many.insert(stringify!($many), nodes);
                    }
                )*
                node
            }

            fn from_node(node: &Node) -> Self {
                Self {
                    id: node.id,
                    version: node.version,
                    $($field: node
                        .field(stringify!($field))
                        .and_then(<$fty as Scalar>::from_value),)*
                    $($one: node
                        .one
                        .get(stringify!($one))
                        .map(|target| Box::new(<$one_ty as Entity>::from_node(target))),)*
                    $($many: node
                        .many
                        .get(stringify!($many))
                        .map(|items| {
                            items.iter().map(<$many_ty as Entity>::from_node).collect::<Vec<_>>()
                        })
                        .into(),)*
                }
            }
        }
    };
}

entity! {
    Person {
        fields {
            firstname: String,
            surname: String,
            organization: String,
            username: String,
            email: String,
            phone: String,
            address1: String,
            address2: String,
            city: String,
            state: String,
            zipcode: String,
            status: String,
        }
        one {}
        many { user_groups [USER_GROUPS]: UserGroup }
    }
}

entity! {
    UserGroup {
        fields { group_name: String }
        one {}
        many { persons [PERSONS]: Person }
    }
}

entity! {
    /// Device category.
    DeviceType {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    Device {
        fields {
            uuid: String,
            name: String,
            description: String,
            mfg_name: String,
            mfg_model: String,
            mfg_serial_number: String,
            info_url_list: String,
        }
        one {
            person [PERSON]: Person,
            device_type [DEVICE_TYPE]: DeviceType,
        }
        many { resources [RESOURCES]: Resource }
    }
}

entity! {
    Software {
        fields {
            name: String,
            description: String,
            uri: String,
            software_version: String,
        }
        one { person [PERSON]: Person }
        many { resources [RESOURCES]: Resource }
    }
}

entity! {
    ResourceType {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    Resource {
        fields {
            name: String,
            description: String,
            uri: String,
            mime_type: String,
            content_length: i64,
        }
        one {
            resource_type [RESOURCE_TYPE]: ResourceType,
            person [PERSON]: Person,
        }
        many { keywords [KEYWORDS]: Keyword }
    }
}

entity! {
    Keyword {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    Event {
        fields {
            name: String,
            description: String,
            start_date: Timestamp,
            end_date: Timestamp,
        }
        one {}
        many {}
    }
}

entity! {
    DataProducerGroup {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    DataContainerGroup {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    StandardUnit {
        fields { name: String, description: String, symbol: String }
        one {}
        many {}
    }
}

entity! {
    StandardVariable {
        fields {
            name: String,
            namespace_uri: String,
            description: String,
            reference_scale: String,
        }
        one {}
        many {}
    }
}

entity! {
    StandardKeyword {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    StandardReferenceScale {
        fields { name: String, description: String }
        one {}
        many {}
    }
}

entity! {
    HeaderDescription {
        fields {
            description: String,
            byte_offset: i64,
            num_header_lines: i64,
        }
        one {}
        many {}
    }
}

entity! {
    /// How to parse the records of a container.
    RecordDescription {
        fields {
            record_type: i64,
            buffer_style: String,
            buffer_parse_type: String,
            buffer_item_separator: String,
            buffer_length_type: String,
            record_terminator: String,
            parseable: bool,
            endian: String,
            record_parse_regexp: String,
        }
        one {}
        many { record_variables [RECORD_VARIABLES]: RecordVariable }
    }
}

entity! {
    RecordVariable {
        fields {
            name: String,
            description: String,
            long_name: String,
            format: String,
            units: String,
            column_index: i64,
            valid_min: String,
            valid_max: String,
            missing_value: String,
            accuracy: String,
            display_min: f64,
            display_max: f64,
            reference_scale: String,
            conversion_scale: f64,
            conversion_offset: f64,
            converted_units: String,
            source_sensor_id: i64,
            parse_regexp: String,
        }
        one {
            record_description [RECORD_DESCRIPTION]: RecordDescription,
            standard_variable [STANDARD_VARIABLE]: StandardVariable,
            standard_unit [STANDARD_UNIT]: StandardUnit,
            standard_reference_scale [STANDARD_REFERENCE_SCALE]: StandardReferenceScale,
            standard_keyword [STANDARD_KEYWORD]: StandardKeyword,
        }
        many {}
    }
}

entity! {
    /// A file or stream of recorded data, keyed by its URI.
    DataContainer {
        fields {
            name: String,
            description: String,
            container_type: String,
            start_date: Timestamp,
            end_date: Timestamp,
            original: bool,
            uri: String,
            content_length: i64,
            mime_type: String,
            number_of_records: i64,
            dods_accessible: bool,
            dods_url: String,
            no_netcdf: bool,
            min_latitude: f64,
            max_latitude: f64,
            min_longitude: f64,
            max_longitude: f64,
            min_depth: f64,
            max_depth: f64,
        }
        one {
            person [PERSON]: Person,
            header_description [HEADER_DESCRIPTION]: HeaderDescription,
            record_description [RECORD_DESCRIPTION]: RecordDescription,
            creator [CREATOR]: DataProducer,
        }
        many {
            groups [GROUPS]: DataContainerGroup,
            keywords [KEYWORDS]: Keyword,
            resources [RESOURCES]: Resource,
            consumers [CONSUMERS]: DataProducer,
        }
    }
}

entity! {
    /// A deployment or process run that produces data.
    DataProducer {
        fields {
            name: String,
            description: String,
            producer_type: String,
            start_date: Timestamp,
            end_date: Timestamp,
            role: String,
            nominal_latitude: f64,
            nominal_latitude_accuracy: f64,
            nominal_longitude: f64,
            nominal_longitude_accuracy: f64,
            nominal_depth: f64,
            nominal_depth_accuracy: f64,
            nominal_benthic_altitude: f64,
            nominal_benthic_altitude_accuracy: f64,
            x_offset: f64,
            y_offset: f64,
            z_offset: f64,
            orientation_description: String,
            x3d_orientation_text: String,
            host_name: String,
        }
        one {
            person [PERSON]: Person,
            device [DEVICE]: Device,
            software [SOFTWARE]: Software,
            parent [PARENT]: DataProducer,
        }
        many {
            children [CHILDREN]: DataProducer,
            groups [GROUPS]: DataProducerGroup,
            inputs [INPUTS]: DataContainer,
            outputs [OUTPUTS]: DataContainer,
            resources [RESOURCES]: Resource,
            keywords [KEYWORDS]: Keyword,
            events [EVENTS]: Event,
        }
    }
}

pub const DEPLOYMENT: &str = "Deployment";
pub const PROCESS_RUN: &str = "ProcessRun";

impl Device {
    pub fn with_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid.into()),
            ..Self::default()
        }
    }
}

impl Person {
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }
}

impl Keyword {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl DataContainer {
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }
}

impl DataProducer {
    pub fn of_type(producer_type: &str) -> Self {
        Self {
            producer_type: Some(producer_type.to_string()),
            ..Self::default()
        }
    }

    /// Add a child producer. Adding a producer as its own child is ignored.
    pub fn add_child(&mut self, child: DataProducer) -> bool {
        if self.is_same_node(&child) {
            return false;
        }
        self.children.push(child);
        true
    }

    pub fn add_output(&mut self, output: DataContainer) {
        self.outputs.push(output);
    }

    pub fn add_input(&mut self, input: DataContainer) {
        self.inputs.push(input);
    }

    fn is_same_node(&self, other: &DataProducer) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl RecordDescription {
    pub fn add_variable(&mut self, variable: RecordVariable) {
        self.record_variables.push(variable);
    }
}
