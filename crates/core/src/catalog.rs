use crate::schema::{BusinessKey, EntityKind, EntitySchema, FieldDef, KeyGen, RelationDef};

use EntityKind as K;

const NAME_LEN: usize = 2048;
const DESCRIPTION_LEN: usize = 2048;
const URI_LEN: usize = 2048;

pub const PRODUCER_TYPES: &[&str] = &["Deployment", "ProcessRun"];
pub const CONTAINER_TYPES: &[&str] = &["File", "Stream"];
pub const PERSON_STATUSES: &[&str] = &["active", "inactive"];
pub const ENDIANS: &[&str] = &["little", "big"];

pub static PERSON: EntitySchema = EntitySchema {
    kind: K::Person,
    table: "person",
    fields: &[
        FieldDef::text("firstname").max_len(NAME_LEN),
        FieldDef::text("surname").max_len(NAME_LEN),
        FieldDef::text("organization").max_len(NAME_LEN),
        FieldDef::text("username").max_len(64),
        FieldDef::text("email").max_len(NAME_LEN),
        FieldDef::text("phone").max_len(64),
        FieldDef::text("address1").max_len(NAME_LEN),
        FieldDef::text("address2").max_len(NAME_LEN),
        FieldDef::text("city").max_len(NAME_LEN),
        FieldDef::text("state").max_len(NAME_LEN),
        FieldDef::text("zipcode").max_len(32),
        FieldDef::text("status").one_of(PERSON_STATUSES),
    ],
    relations: &[RelationDef::many_to_many(
        "user_groups",
        K::UserGroup,
        "person_user_group",
        "person_id",
        "user_group_id",
    )
    .inverse("persons")
    .graph()
    .copied()],
    key: BusinessKey::Unique {
        fields: &["username"],
        fallback: &["email"],
    },
    generated: &[KeyGen::Username {
        field: "username",
        email: "email",
        first: "firstname",
        last: "surname",
    }],
    contact: Some("email"),
};

pub static USER_GROUP: EntitySchema = EntitySchema {
    kind: K::UserGroup,
    table: "user_group",
    fields: &[FieldDef::text("group_name").max_len(NAME_LEN)],
    relations: &[RelationDef::many_to_many(
        "persons",
        K::Person,
        "person_user_group",
        "user_group_id",
        "person_id",
    )
    .inverse("user_groups")],
    key: BusinessKey::Unique {
        fields: &["group_name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "group_name",
        prefix: "UserGroup",
    }],
    contact: None,
};

pub static DEVICE_TYPE: EntitySchema = EntitySchema {
    kind: K::DeviceType,
    table: "device_type",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "DeviceType",
    }],
    contact: None,
};

pub static DEVICE: EntitySchema = EntitySchema {
    kind: K::Device,
    table: "device",
    fields: &[
        FieldDef::text("uuid").max_len(36),
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("mfg_name").max_len(NAME_LEN),
        FieldDef::text("mfg_model").max_len(NAME_LEN),
        FieldDef::text("mfg_serial_number").max_len(NAME_LEN),
        FieldDef::text("info_url_list").max_len(URI_LEN),
    ],
    relations: &[
        RelationDef::to_one("person", "person_id", K::Person).graph().copied(),
        RelationDef::to_one("device_type", "device_type_id", K::DeviceType)
            .graph()
            .copied(),
        RelationDef::many_to_many(
            "resources",
            K::Resource,
            "device_resource",
            "device_id",
            "resource_id",
        )
        .graph()
        .copied(),
    ],
    key: BusinessKey::Unique {
        fields: &["uuid"],
        fallback: &[],
    },
    generated: &[
        KeyGen::TimeUuid { field: "uuid" },
        KeyGen::Suffixed {
            field: "name",
            prefix: "Device",
        },
    ],
    contact: None,
};

pub static SOFTWARE: EntitySchema = EntitySchema {
    kind: K::Software,
    table: "software",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("uri").max_len(URI_LEN),
        FieldDef::text("software_version").max_len(NAME_LEN),
    ],
    relations: &[
        RelationDef::to_one("person", "person_id", K::Person).graph().copied(),
        RelationDef::many_to_many(
            "resources",
            K::Resource,
            "software_resource",
            "software_id",
            "resource_id",
        )
        .graph()
        .copied(),
    ],
    key: BusinessKey::Unique {
        fields: &["name", "software_version"],
        fallback: &[],
    },
    generated: &[
        KeyGen::Suffixed {
            field: "name",
            prefix: "Software",
        },
        KeyGen::Suffixed {
            field: "software_version",
            prefix: "Software_Version",
        },
    ],
    contact: None,
};

pub static RESOURCE_TYPE: EntitySchema = EntitySchema {
    kind: K::ResourceType,
    table: "resource_type",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "ResourceType",
    }],
    contact: None,
};

pub static RESOURCE: EntitySchema = EntitySchema {
    kind: K::Resource,
    table: "resource",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("uri").max_len(URI_LEN),
        FieldDef::text("mime_type").max_len(NAME_LEN),
        FieldDef::integer("content_length"),
    ],
    relations: &[
        RelationDef::to_one("resource_type", "resource_type_id", K::ResourceType)
            .graph()
            .copied(),
        RelationDef::to_one("person", "person_id", K::Person).graph().copied(),
        RelationDef::many_to_many(
            "keywords",
            K::Keyword,
            "resource_keyword",
            "resource_id",
            "keyword_id",
        )
        .graph()
        .copied(),
    ],
    key: BusinessKey::Unique {
        fields: &["uri"],
        fallback: &[],
    },
    generated: &[KeyGen::Uri {
        field: "uri",
        path: "/resources",
        segment: None,
    }],
    contact: None,
};

pub static KEYWORD: EntitySchema = EntitySchema {
    kind: K::Keyword,
    table: "keyword",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "Keyword",
    }],
    contact: None,
};

pub static EVENT: EntitySchema = EntitySchema {
    kind: K::Event,
    table: "event",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::timestamp("start_date"),
        FieldDef::timestamp("end_date"),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name", "start_date", "end_date"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "Event",
    }],
    contact: None,
};

pub static DATA_PRODUCER_GROUP: EntitySchema = EntitySchema {
    kind: K::DataProducerGroup,
    table: "data_producer_group",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "DataProducerGroup",
    }],
    contact: None,
};

pub static DATA_CONTAINER_GROUP: EntitySchema = EntitySchema {
    kind: K::DataContainerGroup,
    table: "data_container_group",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "DataContainerGroup",
    }],
    contact: None,
};

pub static STANDARD_UNIT: EntitySchema = EntitySchema {
    kind: K::StandardUnit,
    table: "standard_unit",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("symbol").max_len(64),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "StandardUnit",
    }],
    contact: None,
};

pub static STANDARD_VARIABLE: EntitySchema = EntitySchema {
    kind: K::StandardVariable,
    table: "standard_variable",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("namespace_uri").max_len(URI_LEN).nullable_key(),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("reference_scale").max_len(NAME_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name", "namespace_uri"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "StandardVariable",
    }],
    contact: None,
};

pub static STANDARD_KEYWORD: EntitySchema = EntitySchema {
    kind: K::StandardKeyword,
    table: "standard_keyword",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "StandardKeyword",
    }],
    contact: None,
};

pub static STANDARD_REFERENCE_SCALE: EntitySchema = EntitySchema {
    kind: K::StandardReferenceScale,
    table: "standard_reference_scale",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
    ],
    relations: &[],
    key: BusinessKey::Unique {
        fields: &["name"],
        fallback: &[],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "StandardReferenceScale",
    }],
    contact: None,
};

pub static HEADER_DESCRIPTION: EntitySchema = EntitySchema {
    kind: K::HeaderDescription,
    table: "header_description",
    fields: &[
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::integer("byte_offset"),
        FieldDef::integer("num_header_lines"),
    ],
    relations: &[],
    key: BusinessKey::SurrogateOnly,
    generated: &[],
    contact: None,
};

pub static RECORD_DESCRIPTION: EntitySchema = EntitySchema {
    kind: K::RecordDescription,
    table: "record_description",
    fields: &[
        FieldDef::integer("record_type"),
        FieldDef::text("buffer_style").max_len(NAME_LEN),
        FieldDef::text("buffer_parse_type").max_len(NAME_LEN),
        FieldDef::text("buffer_item_separator").max_len(NAME_LEN),
        FieldDef::text("buffer_length_type").max_len(NAME_LEN),
        FieldDef::text("record_terminator").max_len(NAME_LEN),
        FieldDef::boolean("parseable"),
        FieldDef::text("endian").one_of(ENDIANS),
        FieldDef::text("record_parse_regexp").max_len(NAME_LEN),
    ],
    relations: &[RelationDef::one_to_many(
        "record_variables",
        K::RecordVariable,
        "record_description",
    )
    .graph()
    .copied()
    .cascade()],
    key: BusinessKey::SurrogateOnly,
    generated: &[],
    contact: None,
};

pub static RECORD_VARIABLE: EntitySchema = EntitySchema {
    kind: K::RecordVariable,
    table: "record_variable",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("long_name").max_len(NAME_LEN),
        FieldDef::text("format").max_len(NAME_LEN),
        FieldDef::text("units").max_len(NAME_LEN),
        FieldDef::integer("column_index"),
        FieldDef::text("valid_min").max_len(NAME_LEN),
        FieldDef::text("valid_max").max_len(NAME_LEN),
        FieldDef::text("missing_value").max_len(NAME_LEN),
        FieldDef::text("accuracy").max_len(NAME_LEN),
        FieldDef::float("display_min"),
        FieldDef::float("display_max"),
        FieldDef::text("reference_scale").max_len(NAME_LEN),
        FieldDef::float("conversion_scale"),
        FieldDef::float("conversion_offset"),
        FieldDef::text("converted_units").max_len(NAME_LEN),
        FieldDef::integer("source_sensor_id"),
        FieldDef::text("parse_regexp").max_len(NAME_LEN),
    ],
    relations: &[
        RelationDef::to_one(
            "record_description",
            "record_description_id",
            K::RecordDescription,
        )
        .inverse("record_variables"),
        RelationDef::to_one("standard_variable", "standard_variable_id", K::StandardVariable)
            .graph()
            .copied(),
        RelationDef::to_one("standard_unit", "standard_unit_id", K::StandardUnit)
            .graph()
            .copied(),
        RelationDef::to_one(
            "standard_reference_scale",
            "standard_reference_scale_id",
            K::StandardReferenceScale,
        )
        .graph()
        .copied(),
        RelationDef::to_one("standard_keyword", "standard_keyword_id", K::StandardKeyword)
            .graph()
            .copied(),
    ],
    key: BusinessKey::Scoped {
        scope: "record_description",
        fields: &["name"],
    },
    generated: &[KeyGen::Suffixed {
        field: "name",
        prefix: "RecordVariable",
    }],
    contact: None,
};

pub static DATA_CONTAINER: EntitySchema = EntitySchema {
    kind: K::DataContainer,
    table: "data_container",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("container_type").one_of(CONTAINER_TYPES),
        FieldDef::timestamp("start_date"),
        FieldDef::timestamp("end_date"),
        FieldDef::boolean("original"),
        FieldDef::text("uri").max_len(URI_LEN),
        FieldDef::integer("content_length"),
        FieldDef::text("mime_type").max_len(NAME_LEN),
        FieldDef::integer("number_of_records"),
        FieldDef::boolean("dods_accessible"),
        FieldDef::text("dods_url").max_len(URI_LEN),
        FieldDef::boolean("no_netcdf"),
        FieldDef::float("min_latitude").range(-90.0, 90.0),
        FieldDef::float("max_latitude").range(-90.0, 90.0),
        FieldDef::float("min_longitude").range(-180.0, 360.0),
        FieldDef::float("max_longitude").range(-180.0, 360.0),
        FieldDef::float("min_depth"),
        FieldDef::float("max_depth"),
    ],
    relations: &[
        RelationDef::to_one("person", "person_id", K::Person).graph().copied(),
        RelationDef::to_one(
            "header_description",
            "header_description_id",
            K::HeaderDescription,
        )
        .graph()
        .copied()
        .cascade(),
        RelationDef::to_one(
            "record_description",
            "record_description_id",
            K::RecordDescription,
        )
        .graph()
        .copied()
        .cascade(),
        RelationDef::many_to_many(
            "groups",
            K::DataContainerGroup,
            "data_container_group_member",
            "data_container_id",
            "data_container_group_id",
        )
        .graph()
        .copied(),
        RelationDef::many_to_many(
            "keywords",
            K::Keyword,
            "data_container_keyword",
            "data_container_id",
            "keyword_id",
        )
        .graph()
        .copied(),
        RelationDef::many_to_many(
            "resources",
            K::Resource,
            "data_container_resource",
            "data_container_id",
            "resource_id",
        )
        .graph()
        .copied(),
        RelationDef::to_one("creator", "creator_id", K::DataProducer).inverse("outputs"),
        RelationDef::many_to_many(
            "consumers",
            K::DataProducer,
            "data_producer_input",
            "data_container_id",
            "data_producer_id",
        )
        .inverse("inputs"),
    ],
    key: BusinessKey::Unique {
        fields: &["uri"],
        fallback: &[],
    },
    generated: &[
        KeyGen::Default {
            field: "container_type",
            value: "File",
        },
        KeyGen::Uri {
            field: "uri",
            path: "/data",
            segment: Some("container_type"),
        },
    ],
    contact: None,
};

pub static DATA_PRODUCER: EntitySchema = EntitySchema {
    kind: K::DataProducer,
    table: "data_producer",
    fields: &[
        FieldDef::text("name").max_len(NAME_LEN),
        FieldDef::text("description").max_len(DESCRIPTION_LEN),
        FieldDef::text("producer_type").one_of(PRODUCER_TYPES),
        FieldDef::timestamp("start_date"),
        FieldDef::timestamp("end_date"),
        FieldDef::text("role").max_len(NAME_LEN),
        FieldDef::float("nominal_latitude").range(-90.0, 90.0),
        FieldDef::float("nominal_latitude_accuracy"),
        FieldDef::float("nominal_longitude").range(-180.0, 360.0),
        FieldDef::float("nominal_longitude_accuracy"),
        FieldDef::float("nominal_depth"),
        FieldDef::float("nominal_depth_accuracy"),
        FieldDef::float("nominal_benthic_altitude"),
        FieldDef::float("nominal_benthic_altitude_accuracy"),
        FieldDef::float("x_offset"),
        FieldDef::float("y_offset"),
        FieldDef::float("z_offset"),
        FieldDef::text("orientation_description").max_len(DESCRIPTION_LEN),
        FieldDef::text("x3d_orientation_text").max_len(DESCRIPTION_LEN),
        FieldDef::text("host_name").max_len(NAME_LEN),
    ],
    relations: &[
        RelationDef::to_one("person", "person_id", K::Person).graph().copied(),
        RelationDef::to_one("device", "device_id", K::Device).graph().copied(),
        RelationDef::to_one("software", "software_id", K::Software)
            .graph()
            .copied(),
        RelationDef::to_one("parent", "parent_id", K::DataProducer).inverse("children"),
        RelationDef::one_to_many("children", K::DataProducer, "parent").copied(),
        RelationDef::many_to_many(
            "groups",
            K::DataProducerGroup,
            "data_producer_group_member",
            "data_producer_id",
            "data_producer_group_id",
        )
        .graph()
        .copied(),
        RelationDef::many_to_many(
            "inputs",
            K::DataContainer,
            "data_producer_input",
            "data_producer_id",
            "data_container_id",
        )
        .inverse("consumers")
        .graph()
        .copied(),
        RelationDef::one_to_many("outputs", K::DataContainer, "creator")
            .graph()
            .copied(),
        RelationDef::many_to_many(
            "resources",
            K::Resource,
            "data_producer_resource",
            "data_producer_id",
            "resource_id",
        )
        .graph()
        .copied(),
        RelationDef::many_to_many(
            "keywords",
            K::Keyword,
            "data_producer_keyword",
            "data_producer_id",
            "keyword_id",
        )
        .graph()
        .copied(),
        RelationDef::many_to_many(
            "events",
            K::Event,
            "data_producer_event",
            "data_producer_id",
            "event_id",
        )
        .graph()
        .copied(),
    ],
    key: BusinessKey::SharedOutput {
        type_field: "producer_type",
        outputs: "outputs",
    },
    generated: &[
        KeyGen::Default {
            field: "producer_type",
            value: "Deployment",
        },
        KeyGen::FromField {
            field: "name",
            source: "producer_type",
        },
    ],
    contact: None,
};

pub fn schema_of(kind: EntityKind) -> &'static EntitySchema {
    match kind {
        K::Person => &PERSON,
        K::UserGroup => &USER_GROUP,
        K::DeviceType => &DEVICE_TYPE,
        K::Device => &DEVICE,
        K::Software => &SOFTWARE,
        K::ResourceType => &RESOURCE_TYPE,
        K::Resource => &RESOURCE,
        K::Keyword => &KEYWORD,
        K::Event => &EVENT,
        K::DataProducerGroup => &DATA_PRODUCER_GROUP,
        K::DataContainerGroup => &DATA_CONTAINER_GROUP,
        K::StandardUnit => &STANDARD_UNIT,
        K::StandardVariable => &STANDARD_VARIABLE,
        K::StandardKeyword => &STANDARD_KEYWORD,
        K::StandardReferenceScale => &STANDARD_REFERENCE_SCALE,
        K::HeaderDescription => &HEADER_DESCRIPTION,
        K::RecordDescription => &RECORD_DESCRIPTION,
        K::RecordVariable => &RECORD_VARIABLE,
        K::DataContainer => &DATA_CONTAINER,
        K::DataProducer => &DATA_PRODUCER,
    }
}

/// Every schema, in dependency-friendly order (referenced tables first).
pub fn all() -> impl Iterator<Item = &'static EntitySchema> {
    EntityKind::ALL.into_iter().map(schema_of)
}

/// Every relation anywhere in the catalog that points at `kind`, paired with
/// the schema declaring it.
pub fn inbound(
    kind: EntityKind,
) -> impl Iterator<Item = (&'static EntitySchema, &'static crate::schema::RelationDef)> {
    all().flat_map(move |schema| {
        schema
            .relations
            .iter()
            .filter(move |rel| rel.target == kind)
            .map(move |rel| (schema, rel))
    })
}
