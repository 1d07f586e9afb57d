//! Entity schema registry
//!
//! Every table the service manages is described once, statically, by an
//! [`EntitySchema`]. List, filter, form, import and export code consume these
//! descriptors instead of inspecting rows at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::forms::{EntityRules, LegacyRules, ReferenceRules, SpecimenRules};

/// Entity kinds served by the generic list/detail/edit routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Specimen,
    Locality,
    Initials,
    ButterflyCollection,
    Trap,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Specimen,
        Self::Locality,
        Self::Initials,
        Self::ButterflyCollection,
        Self::Trap,
    ];

    /// Lowercase route name, e.g. `butterflycollection`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specimen => "specimen",
            Self::Locality => "locality",
            Self::Initials => "initials",
            Self::ButterflyCollection => "butterflycollection",
            Self::Trap => "trap",
        }
    }

    /// Static schema descriptor for this kind.
    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            Self::Specimen => &SPECIMEN,
            Self::Locality => &LOCALITY,
            Self::Initials => &INITIALS,
            Self::ButterflyCollection => &BUTTERFLY_COLLECTION,
            Self::Trap => &TRAP,
        }
    }

    /// Form rules for this kind.
    pub fn rules(&self) -> &'static dyn EntityRules {
        match self {
            Self::Specimen => &SpecimenRules,
            Self::Locality | Self::Initials => &ReferenceRules,
            Self::ButterflyCollection | Self::Trap => &LegacyRules,
        }
    }

    /// Locality and Initials are reference data: only admins may change them.
    pub fn is_reference_data(&self) -> bool {
        matches!(self, Self::Locality | Self::Initials)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unknown entity names in routes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown entity kind '{0}'")]
pub struct UnknownEntity(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEntity(s.to_owned()))
    }
}

/// Storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Short text with a maximum length.
    Text(usize),
    /// Unbounded text.
    LongText,
    Date,
    Time,
    Timestamp,
    /// Text restricted to a fixed set of values.
    Choice(&'static [&'static str]),
    /// Natural-key reference to another entity.
    ForeignKey(EntityKind),
}

impl FieldKind {
    /// Postgres cast applied to bound text parameters.
    pub fn sql_cast(&self) -> &'static str {
        match self {
            Self::Date => "::date",
            Self::Time => "::time",
            Self::Timestamp => "::timestamptz",
            _ => "",
        }
    }
}

/// One column of an entity.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Entries are appended, never overwritten.
    pub append_only: bool,
    /// Part of the taxonomic identification block.
    pub taxonomic: bool,
    /// Maintained by the service (derived or timestamped), not user input.
    pub managed: bool,
}

impl FieldDescriptor {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            append_only: false,
            taxonomic: false,
            managed: false,
        }
    }

    const fn text(name: &'static str, max: usize) -> Self {
        Self::new(name, FieldKind::Text(max))
    }

    const fn long(name: &'static str) -> Self {
        Self::new(name, FieldKind::LongText)
    }

    const fn append_only(mut self) -> Self {
        self.append_only = true;
        self
    }

    const fn taxonomic(mut self) -> Self {
        self.taxonomic = true;
        self
    }

    const fn managed(mut self) -> Self {
        self.managed = true;
        self
    }

    /// Target entity when this field is a foreign key.
    pub fn foreign_key(&self) -> Option<EntityKind> {
        match self.kind {
            FieldKind::ForeignKey(target) => Some(target),
            _ => None,
        }
    }

    /// Allowed values when this field is a choice.
    pub fn choices(&self) -> Option<&'static [&'static str]> {
        match self.kind {
            FieldKind::Choice(values) => Some(values),
            _ => None,
        }
    }

    /// Whether users may set this field directly through a form.
    pub fn is_user_editable(&self) -> bool {
        !self.managed && !self.append_only
    }
}

/// Field-specific filter behavior applied before the generic substring filters.
#[derive(Debug, Clone, Copy)]
pub struct SpecialFilter {
    /// Query parameter name.
    pub key: &'static str,
    /// Field the predicate is built against.
    pub field: &'static str,
    pub range_support: bool,
    /// Also constrain catalog numbers to start with the expanded years.
    pub catalog_year_prefix: bool,
}

/// Static description of one table.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Human-readable name.
    pub label: &'static str,
    /// Business key referenced by foreign keys.
    pub natural_key: Option<&'static str>,
    /// Column used for keyset pagination; `None` means the primary key.
    pub keyset_column: Option<&'static str>,
    /// Table carries `created_at` / `updated_at`.
    pub timestamps: bool,
    pub fields: &'static [FieldDescriptor],
    pub special_filters: &'static [SpecialFilter],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn special_filter(&self, key: &str) -> Option<&'static SpecialFilter> {
        self.special_filters.iter().find(|s| s.key == key)
    }

    /// Fields that can appear in a create/edit form.
    pub fn editable_fields(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_user_editable())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }
}

const TRUE_FALSE: &[&str] = &["TRUE", "FALSE"];

/// Allowed values of `Specimen.sex`.
pub const SEX_CHOICES: &[&str] = &["male", "female", "."];

static SPECIMEN_FIELDS: [FieldDescriptor; 39] = [
    FieldDescriptor::long("modified").append_only(),
    FieldDescriptor::text("specimenNumber", 100),
    FieldDescriptor::text("catalogNumber", 100).managed(),
    FieldDescriptor::new("recordedBy", FieldKind::ForeignKey(EntityKind::Initials)),
    FieldDescriptor::new("uploaded_iNaturalist", FieldKind::Choice(TRUE_FALSE)),
    FieldDescriptor::new("sex", FieldKind::Choice(SEX_CHOICES)),
    FieldDescriptor::long("behavior").append_only(),
    FieldDescriptor::long("disposition").append_only(),
    FieldDescriptor::long("occurrenceRemarks").append_only(),
    FieldDescriptor::new("eventDate", FieldKind::Date),
    FieldDescriptor::new("eventTime", FieldKind::Time),
    FieldDescriptor::text("year", 4),
    FieldDescriptor::text("month", 2),
    FieldDescriptor::text("day", 2),
    FieldDescriptor::text("habitat", 255),
    FieldDescriptor::long("habitatNotes"),
    FieldDescriptor::long("samplingProtocol"),
    FieldDescriptor::new("locality", FieldKind::ForeignKey(EntityKind::Locality)),
    FieldDescriptor::long("localityDescriptionNotes"),
    FieldDescriptor::text("minimumElevationInMeters", 20),
    FieldDescriptor::text("maximumElevationInMeters", 20),
    FieldDescriptor::text("decimalLatitude", 20),
    FieldDescriptor::text("decimalLongitude", 20),
    FieldDescriptor::new("exact_loc", FieldKind::Choice(TRUE_FALSE)),
    FieldDescriptor::text("coordinateUncertaintyInMeters", 100),
    FieldDescriptor::new("georeferencedBy", FieldKind::ForeignKey(EntityKind::Initials)),
    FieldDescriptor::new("georeferencedDate", FieldKind::Date),
    FieldDescriptor::long("georeferenceProtocol"),
    FieldDescriptor::new("identifiedBy", FieldKind::ForeignKey(EntityKind::Initials)),
    FieldDescriptor::new("dateIdentified", FieldKind::Date),
    FieldDescriptor::long("identificationReferences"),
    FieldDescriptor::long("identificationRemarks"),
    FieldDescriptor::text("family", 100).taxonomic(),
    FieldDescriptor::text("subfamily", 100).taxonomic(),
    FieldDescriptor::text("tribe", 100).taxonomic(),
    FieldDescriptor::text("subtribe", 100).taxonomic(),
    FieldDescriptor::text("genus", 100).taxonomic(),
    FieldDescriptor::text("specificEpithet", 100).taxonomic(),
    FieldDescriptor::text("infraspecificEpithet", 100).taxonomic(),
];

static SPECIMEN_SPECIAL: [SpecialFilter; 4] = [
    SpecialFilter {
        key: "catalogNumber",
        field: "catalogNumber",
        range_support: true,
        catalog_year_prefix: false,
    },
    SpecialFilter {
        key: "locality",
        field: "locality",
        range_support: false,
        catalog_year_prefix: false,
    },
    SpecialFilter {
        key: "specimenNumber",
        field: "specimenNumber",
        range_support: true,
        catalog_year_prefix: false,
    },
    SpecialFilter {
        key: "year",
        field: "year",
        range_support: true,
        catalog_year_prefix: true,
    },
];

pub static SPECIMEN: EntitySchema = EntitySchema {
    kind: EntityKind::Specimen,
    table: "specimenTable",
    label: "Specimen",
    natural_key: Some("catalogNumber"),
    keyset_column: Some("catalogNumber"),
    timestamps: false,
    fields: &SPECIMEN_FIELDS,
    special_filters: &SPECIMEN_SPECIAL,
};

static LOCALITY_FIELDS: [FieldDescriptor; 8] = [
    FieldDescriptor::text("localityCode", 100),
    FieldDescriptor::text("country", 100),
    FieldDescriptor::text("region", 100),
    FieldDescriptor::text("province", 100),
    FieldDescriptor::text("district", 100),
    FieldDescriptor::text("siteName", 255),
    FieldDescriptor::long("siteDescription"),
    FieldDescriptor::text("habitat", 255),
];

pub static LOCALITY: EntitySchema = EntitySchema {
    kind: EntityKind::Locality,
    table: "localityTable",
    label: "Locality",
    natural_key: Some("localityCode"),
    keyset_column: None,
    timestamps: false,
    fields: &LOCALITY_FIELDS,
    special_filters: &[],
};

static INITIALS_FIELDS: [FieldDescriptor; 4] = [
    FieldDescriptor::text("initials", 10),
    FieldDescriptor::text("name", 255),
    FieldDescriptor::text("relationshipOrTitle", 255),
    FieldDescriptor::text("yearAndTerm", 50),
];

pub static INITIALS: EntitySchema = EntitySchema {
    kind: EntityKind::Initials,
    table: "initialsTable",
    label: "Initials",
    natural_key: Some("initials"),
    keyset_column: None,
    timestamps: false,
    fields: &INITIALS_FIELDS,
    special_filters: &[],
};

static TRAP_FIELDS: [FieldDescriptor; 7] = [
    FieldDescriptor::text("butterflyID", 100),
    FieldDescriptor::text("name", 100),
    FieldDescriptor::long("location_description"),
    FieldDescriptor::new("setup_date", FieldKind::Date),
    FieldDescriptor::long("notes"),
    FieldDescriptor::new("created_at", FieldKind::Timestamp).managed(),
    FieldDescriptor::new("updated_at", FieldKind::Timestamp).managed(),
];

pub static TRAP: EntitySchema = EntitySchema {
    kind: EntityKind::Trap,
    table: "butterflies_trap",
    label: "Trap",
    natural_key: Some("butterflyID"),
    keyset_column: None,
    timestamps: true,
    fields: &TRAP_FIELDS,
    special_filters: &[],
};

static BUTTERFLY_COLLECTION_FIELDS: [FieldDescriptor; 7] = [
    FieldDescriptor::text("species", 100),
    FieldDescriptor::text("collector_name", 100),
    FieldDescriptor::new("collection_date", FieldKind::Timestamp),
    FieldDescriptor::new("trap", FieldKind::ForeignKey(EntityKind::Trap)),
    FieldDescriptor::long("notes"),
    FieldDescriptor::new("created_at", FieldKind::Timestamp).managed(),
    FieldDescriptor::new("updated_at", FieldKind::Timestamp).managed(),
];

pub static BUTTERFLY_COLLECTION: EntitySchema = EntitySchema {
    kind: EntityKind::ButterflyCollection,
    table: "butterflies_butterflycollection",
    label: "Butterfly Collection",
    natural_key: None,
    keyset_column: None,
    timestamps: true,
    fields: &BUTTERFLY_COLLECTION_FIELDS,
    special_filters: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_names() {
        assert_eq!("specimen".parse::<EntityKind>().unwrap(), EntityKind::Specimen);
        assert_eq!(
            "ButterflyCollection".parse::<EntityKind>().unwrap(),
            EntityKind::ButterflyCollection
        );
        assert!("user".parse::<EntityKind>().is_err());
    }

    #[test]
    fn every_foreign_key_targets_a_natural_key() {
        for kind in EntityKind::ALL {
            for field in kind.schema().fields {
                if let Some(target) = field.foreign_key() {
                    assert!(
                        target.schema().natural_key.is_some(),
                        "{}.{} points at {} which has no natural key",
                        kind,
                        field.name,
                        target
                    );
                }
            }
        }
    }

    #[test]
    fn catalog_number_is_not_user_editable() {
        let field = SPECIMEN.field("catalogNumber").unwrap();
        assert!(!field.is_user_editable());
        assert!(SPECIMEN.editable_fields().all(|f| f.name != "modified"));
    }

    #[test]
    fn special_filters_reference_real_fields() {
        for kind in EntityKind::ALL {
            let schema = kind.schema();
            for special in schema.special_filters {
                assert!(schema.field(special.field).is_some(), "{}", special.field);
            }
        }
    }
}
