// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Contracts,
    Maintenance,
    Vehicles,
    Patients,
    Users,
    Roles,
}

impl Collection {
    pub const ALL: [Self; 6] = [
        Self::Contracts,
        Self::Maintenance,
        Self::Vehicles,
        Self::Patients,
        Self::Users,
        Self::Roles,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contracts => "contracts",
            Self::Maintenance => "maintenance",
            Self::Vehicles => "vehicles",
            Self::Patients => "patients",
            Self::Users => "users",
            Self::Roles => "roles",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contracts" => Some(Self::Contracts),
            "maintenance" => Some(Self::Maintenance),
            "vehicles" => Some(Self::Vehicles),
            "patients" => Some(Self::Patients),
            "users" => Some(Self::Users),
            "roles" => Some(Self::Roles),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Contracts => "contracts",
            Self::Maintenance => "maint",
            Self::Vehicles => "vehicles",
            Self::Patients => "patients",
            Self::Users => "users",
            Self::Roles => "roles",
        }
    }

    pub const fn path(self) -> &'static str {
        match self {
            Self::Contracts => "client-contracts",
            Self::Maintenance => "corrective-maintenances",
            Self::Vehicles => "vehicles",
            Self::Patients => "patients",
            Self::Users => "users",
            Self::Roles => "users-permissions/roles",
        }
    }

    pub const fn envelope(self) -> Envelope {
        match self {
            Self::Users => Envelope::Bare,
            Self::Roles => Envelope::Keyed("roles"),
            Self::Contracts | Self::Maintenance | Self::Vehicles | Self::Patients => {
                Envelope::Data
            }
        }
    }

    pub const fn body_shape(self) -> BodyShape {
        match self {
            Self::Users | Self::Roles => BodyShape::Raw,
            Self::Contracts | Self::Maintenance | Self::Vehicles | Self::Patients => {
                BodyShape::Wrapped
            }
        }
    }

    pub const fn mutation_key(self) -> MutationKey {
        match self {
            Self::Users | Self::Roles => MutationKey::Id,
            Self::Contracts | Self::Maintenance | Self::Vehicles | Self::Patients => {
                MutationKey::DocumentId
            }
        }
    }

    pub const fn columns(self) -> &'static [ColumnSpec] {
        match self {
            Self::Contracts => CONTRACT_COLUMNS,
            Self::Maintenance => MAINTENANCE_COLUMNS,
            Self::Vehicles => VEHICLE_COLUMNS,
            Self::Patients => PATIENT_COLUMNS,
            Self::Users => USER_COLUMNS,
            Self::Roles => ROLE_COLUMNS,
        }
    }

    pub fn column(self, key: &str) -> Option<&'static ColumnSpec> {
        self.columns().iter().find(|column| column.key == key)
    }

    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Roles => &["name"],
            Self::Vehicles => &["plate"],
            Self::Users => &["username", "email"],
            Self::Patients => &["name"],
            Self::Contracts | Self::Maintenance => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Data,
    Bare,
    Keyed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    Wrapped,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKey {
    Id,
    DocumentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Placeholder(&'static str),
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    // Tried in order; the first non-empty one wins.
    pub sources: &'static [&'static str],
    pub fallback: Fallback,
    pub searchable: bool,
}

const fn text(
    key: &'static str,
    label: &'static str,
    sources: &'static [&'static str],
    placeholder: &'static str,
    searchable: bool,
) -> ColumnSpec {
    ColumnSpec {
        key,
        label,
        kind: FieldKind::Text,
        sources,
        fallback: Fallback::Placeholder(placeholder),
        searchable,
    }
}

const fn typed(
    key: &'static str,
    label: &'static str,
    kind: FieldKind,
    sources: &'static [&'static str],
    fallback: Fallback,
) -> ColumnSpec {
    ColumnSpec {
        key,
        label,
        kind,
        sources,
        fallback,
        searchable: false,
    }
}

const CONTRACT_COLUMNS: &[ColumnSpec] = &[
    text("patient", "responsible", &["responsible"], "Sin nombre", true),
    text("entity", "entity", &["entity"], "Sin entidad", true),
    text("type", "type", &["typeContract"], "Sin tipo", false),
    typed(
        "dateRegister",
        "registered",
        FieldKind::Date,
        &["dateRegister"],
        Fallback::Placeholder("Sin fecha"),
    ),
    typed(
        "dateStart",
        "start",
        FieldKind::Date,
        &["dateStart"],
        Fallback::Placeholder("Sin fecha"),
    ),
    text("status", "status", &["state"], "Scheduled", false),
    typed(
        "amount",
        "advance",
        FieldKind::Number,
        &["advance"],
        Fallback::Zero,
    ),
    text("address", "zone", &["zone"], "Sin zona", false),
];

const MAINTENANCE_COLUMNS: &[ColumnSpec] = &[
    text(
        "descriptionFailure",
        "failure",
        &["descriptionFailure"],
        "Sin descripción",
        true,
    ),
    typed(
        "dateReport",
        "reported",
        FieldKind::Date,
        &["dateReport"],
        Fallback::Placeholder("Sin fecha"),
    ),
    typed(
        "dateStart",
        "start",
        FieldKind::Date,
        &["dateStart"],
        Fallback::Placeholder("Sin fecha"),
    ),
    typed(
        "dateEnd",
        "end",
        FieldKind::Date,
        &["dateEnd"],
        Fallback::Placeholder("Sin fecha"),
    ),
    text("priority", "priority", &["priority"], "Sin prioridad", false),
    text(
        "providerMechanical",
        "provider",
        &["providerMechanical"],
        "Sin proveedor",
        true,
    ),
    typed(
        "state",
        "open",
        FieldKind::Bool,
        &["state"],
        Fallback::Placeholder("Sin estado"),
    ),
];

const VEHICLE_COLUMNS: &[ColumnSpec] = &[
    text("plate", "plate", &["plate"], "Sin placa", true),
    text("brand", "brand", &["brand"], "Sin marca", true),
    text("model", "model", &["model"], "Sin modelo", true),
    text("line", "line", &["line"], "Sin línea", false),
    text("color", "color", &["color"], "Sin color", false),
    typed(
        "cylinderCapacity",
        "cc",
        FieldKind::Number,
        &["cylinderCapacity"],
        Fallback::Placeholder("Sin cilindraje"),
    ),
    typed(
        "mileage",
        "km",
        FieldKind::Number,
        &["mileage"],
        Fallback::Placeholder("Sin kilometraje"),
    ),
    typed(
        "passengers",
        "seats",
        FieldKind::Number,
        &["passengers"],
        Fallback::Placeholder("Sin pasajeros"),
    ),
    text("service", "service", &["service"], "Sin servicio", false),
    text(
        "vehicleClass",
        "class",
        &["vehicleClass"],
        "Sin clase",
        false,
    ),
    text(
        "internalNumber",
        "internal",
        &["internalNumber"],
        "Sin número interno",
        true,
    ),
];

const PATIENT_COLUMNS: &[ColumnSpec] = &[
    text("name", "name", &["name"], "Sin Nombre", true),
    text("EPS", "eps", &["EPS"], "Sin EPS Asignada", false),
    text(
        "typeDocument",
        "doc type",
        &["typeDocument"],
        "Sin tipo de documento",
        false,
    ),
    typed(
        "numberDocument",
        "doc #",
        FieldKind::Number,
        &["numberDocument"],
        Fallback::Placeholder("Sin numero de documento"),
    ),
    text("regime", "regime", &["regime"], "Sin regimen", false),
    text("gender", "gender", &["gender"], "Sin genero", false),
    text("phone", "phone", &["phone"], "Sin telefono", false),
    text("city", "city", &["city"], "Sin ciudad", true),
    text(
        "address",
        "address",
        &["addres", "address"],
        "Sin direccion",
        false,
    ),
    text("email", "email", &["email"], "Sin email", true),
    typed(
        "date",
        "date",
        FieldKind::Date,
        &["date"],
        Fallback::Placeholder("Sin fecha"),
    ),
    text("status", "status", &["status"], "Sin estado", false),
];

const USER_COLUMNS: &[ColumnSpec] = &[
    text("name", "name", &["name", "username"], "Sin Nombre", true),
    text("username", "username", &["username"], "Sin usuario", true),
    text("email", "email", &["email"], "Sin email", true),
    text(
        "typeDocument",
        "doc type",
        &["typeDocument"],
        "Sin tipo de documento",
        false,
    ),
    typed(
        "numberDocument",
        "doc #",
        FieldKind::Number,
        &["numberDocument"],
        Fallback::Placeholder("Sin numero de documento"),
    ),
    text("phone", "phone", &["phone"], "Sin telefono", false),
    text("positionJob", "position", &["positionJob"], "Sin cargo", false),
    text("city", "city", &["city"], "Sin ciudad", false),
    typed(
        "blocked",
        "blocked",
        FieldKind::Bool,
        &["blocked"],
        Fallback::Placeholder("Sin estado"),
    ),
];

const ROLE_COLUMNS: &[ColumnSpec] = &[
    text("name", "name", &["name"], "Sin Nombre", true),
    text(
        "description",
        "description",
        &["description"],
        "Sin descripción",
        true,
    ),
    text("type", "type", &["type"], "Sin tipo", false),
    typed(
        "nb_users",
        "users",
        FieldKind::Number,
        &["nb_users"],
        Fallback::Zero,
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
    Unsorted,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
            Self::Unsorted => "none",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Collection, Envelope, Fallback, MutationKey};
    use std::collections::BTreeSet;

    #[test]
    fn collection_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(Collection::parse(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::parse(" Vehicles "), Some(Collection::Vehicles));
        assert_eq!(Collection::parse("trucks"), None);
    }

    #[test]
    fn column_keys_are_unique_per_collection() {
        for collection in Collection::ALL {
            let keys = collection
                .columns()
                .iter()
                .map(|column| column.key)
                .collect::<BTreeSet<_>>();
            assert_eq!(keys.len(), collection.columns().len(), "{collection:?}");
        }
    }

    #[test]
    fn every_collection_has_a_searchable_column_and_nonempty_placeholders() {
        for collection in Collection::ALL {
            assert!(
                collection.columns().iter().any(|column| column.searchable),
                "{collection:?} needs a searchable column"
            );
            for column in collection.columns() {
                if let Fallback::Placeholder(text) = column.fallback {
                    assert!(!text.trim().is_empty(), "{}", column.key);
                }
                assert!(!column.sources.is_empty(), "{}", column.key);
            }
        }
    }

    #[test]
    fn wire_details_follow_backend_conventions() {
        assert_eq!(Collection::Users.envelope(), Envelope::Bare);
        assert_eq!(Collection::Roles.envelope(), Envelope::Keyed("roles"));
        assert_eq!(Collection::Vehicles.envelope(), Envelope::Data);
        assert_eq!(Collection::Roles.mutation_key(), MutationKey::Id);
        assert_eq!(
            Collection::Contracts.mutation_key(),
            MutationKey::DocumentId
        );
        assert_eq!(Collection::Roles.path(), "users-permissions/roles");
    }
}
