// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use fleetdesk_app::{Collection, CollectionEndpoint, MutationKey, RemoteError};
use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEMO_TOKEN: &str = "demo-token";

const FIRST_NAMES: [&str; 16] = [
    "Ana", "Carlos", "Daniela", "Diego", "Camila", "Andrés", "Valentina", "Juan", "Laura",
    "Santiago", "Mariana", "Felipe", "Paula", "Mateo", "Sofía", "Julián",
];
const LAST_NAMES: [&str; 14] = [
    "García", "Rodríguez", "Martínez", "López", "Gómez", "Pérez", "Ramírez", "Torres", "Díaz",
    "Vargas", "Castro", "Rojas", "Moreno", "Ruiz",
];
const CITIES: [&str; 8] = [
    "Bogotá",
    "Medellín",
    "Cali",
    "Barranquilla",
    "Bucaramanga",
    "Pereira",
    "Manizales",
    "Cartagena",
];
const EPS: [&str; 6] = [
    "Sura",
    "Sanitas",
    "Nueva EPS",
    "Salud Total",
    "Compensar",
    "Famisanar",
];
const BRANDS: [(&str, &[&str]); 5] = [
    ("Toyota", &["Hilux", "Fortuner", "Prado"]),
    ("Chevrolet", &["NHR", "D-Max", "Tracker"]),
    ("Renault", &["Duster", "Master", "Kangoo"]),
    ("Nissan", &["Frontier", "Urvan", "X-Trail"]),
    ("Mercedes-Benz", &["Sprinter", "Vito", "Clase G"]),
];
const COLORS: [&str; 6] = ["Blanco", "Gris", "Negro", "Rojo", "Plata", "Azul"];
const FAILURES: [&str; 8] = [
    "Falla en frenos delanteros",
    "Ruido en la suspensión",
    "Luces de emergencia intermitentes",
    "Fuga de aceite del motor",
    "Batería descargada",
    "Aire acondicionado sin enfriar",
    "Camilla con rueda trabada",
    "Sirena sin sonido",
];
const WORKSHOPS: [&str; 5] = [
    "Taller Los Andes",
    "Servicentro La 80",
    "Mecánica Rápida SAS",
    "AutoFrenos del Valle",
    "Diesel Express",
];
const POSITIONS: [&str; 5] = [
    "Conductor",
    "Paramédico",
    "Coordinador",
    "Auxiliar administrativo",
    "Jefe de flota",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn chance(&mut self, one_in: usize) -> bool {
        self.int_n(one_in) == 0
    }
}

#[derive(Debug, Clone)]
pub struct FleetFaker {
    rng: DeterministicRng,
}

impl FleetFaker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(if seed == 0 { 1 } else { seed }),
        }
    }

    pub fn records(&mut self, collection: Collection, count: usize) -> Vec<Value> {
        (1..=count as i64)
            .map(|id| self.record(collection, id))
            .collect()
    }

    pub fn record(&mut self, collection: Collection, id: i64) -> Value {
        let mut record = match collection {
            Collection::Contracts => self.contract(),
            Collection::Maintenance => self.maintenance(),
            Collection::Vehicles => self.vehicle(),
            Collection::Patients => self.patient(),
            Collection::Users => self.user(),
            Collection::Roles => self.role(),
        };
        record.insert("id".to_owned(), json!(id));
        if collection.mutation_key() == MutationKey::DocumentId {
            record.insert("documentId".to_owned(), json!(document_id(collection, id)));
        }
        Value::Object(record)
    }

    fn contract(&mut self) -> Map<String, Value> {
        let responsible = self.sometimes_null(8, |faker| json!(faker.full_name()));
        object(json!({
            "responsible": responsible,
            "entity": self.pick(&EPS),
            "typeContract": self.pick(&["Evento", "Mensual", "Anual"]),
            "dateRegister": self.date(),
            "dateStart": self.date(),
            "state": self.pick(&["Active", "Scheduled", "Finished"]),
            "advance": self.int_range(0, 40) * 50_000,
            "zone": self.pick(&CITIES),
        }))
    }

    fn maintenance(&mut self) -> Map<String, Value> {
        let date_end = self.sometimes_null(3, |faker| json!(faker.date()));
        object(json!({
            "descriptionFailure": self.pick(&FAILURES),
            "dateReport": self.date(),
            "dateStart": self.date(),
            "dateEnd": date_end,
            "priority": self.pick(&["Alta", "Media", "Baja"]),
            "providerMechanical": self.pick(&WORKSHOPS),
            "state": self.rng.chance(2),
        }))
    }

    fn vehicle(&mut self) -> Map<String, Value> {
        let (brand, lines) = BRANDS[self.rng.int_n(BRANDS.len())];
        let plate = format!(
            "{}{}{}{:03}",
            self.letter(),
            self.letter(),
            self.letter(),
            self.int_range(0, 999)
        );
        object(json!({
            "plate": plate,
            "brand": brand,
            "model": self.int_range(2012, 2025).to_string(),
            "line": self.pick(lines),
            "color": self.pick(&COLORS),
            "cylinderCapacity": self.int_range(12, 40) * 100,
            "mileage": self.int_range(1_000, 300_000),
            "passengers": self.int_range(2, 15),
            "service": self.pick(&["Público", "Particular"]),
            "vehicleClass": self.pick(&["Ambulancia", "Camioneta", "Automóvil", "Microbús"]),
            "internalNumber": format!("M-{:03}", self.int_range(1, 200)),
        }))
    }

    fn patient(&mut self) -> Map<String, Value> {
        let eps = self.sometimes_null(6, |faker| json!(faker.pick(&EPS)));
        let name = self.full_name();
        let email = email_for(&name);
        object(json!({
            "name": name,
            "EPS": eps,
            "typeDocument": self.pick(&["CC", "TI", "CE", "RC"]),
            "numberDocument": self.int_range(10_000_000, 1_099_999_999),
            "regime": self.pick(&["Contributivo", "Subsidiado"]),
            "gender": self.pick(&["F", "M"]),
            "phone": format!("3{:09}", self.int_range(0, 999_999_999)),
            "city": self.pick(&CITIES),
            "addres": format!(
                "Calle {} # {}-{}",
                self.int_range(1, 150),
                self.int_range(1, 99),
                self.int_range(1, 99)
            ),
            "email": email,
            "date": self.date(),
            "status": self.pick(&["Activo", "Inactivo"]),
        }))
    }

    fn user(&mut self) -> Map<String, Value> {
        let name = self.full_name();
        let username = name.to_lowercase().replace(' ', ".");
        object(json!({
            "username": username,
            "email": email_for(&name),
            "name": name,
            "typeDocument": "CC",
            "numberDocument": self.int_range(10_000_000, 1_099_999_999),
            "phone": format!("3{:09}", self.int_range(0, 999_999_999)),
            "positionJob": self.pick(&POSITIONS),
            "city": self.pick(&CITIES),
            "blocked": self.rng.chance(5),
            "confirmed": true,
        }))
    }

    fn role(&mut self) -> Map<String, Value> {
        let name = self.pick(&["Authenticated", "Public", "Coordinador", "Conductor"]);
        object(json!({
            "name": name,
            "description": format!("Rol {}", name.to_lowercase()),
            "type": name.to_lowercase(),
            "nb_users": self.int_range(0, 25),
        }))
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn letter(&mut self) -> char {
        char::from(b'A' + self.rng.int_n(26) as u8)
    }

    fn full_name(&mut self) -> String {
        format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES))
    }

    fn date(&mut self) -> String {
        format!(
            "{}-{:02}-{:02}",
            self.int_range(2023, 2025),
            self.int_range(1, 12),
            self.int_range(1, 28)
        )
    }

    fn sometimes_null(&mut self, one_in: usize, value: impl FnOnce(&mut Self) -> Value) -> Value {
        if self.rng.chance(one_in) {
            Value::Null
        } else {
            value(self)
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn email_for(name: &str) -> String {
    let local = name
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            ' ' => '.',
            other => other,
        })
        .collect::<String>();
    format!("{local}@example.com")
}

fn document_id(collection: Collection, id: i64) -> String {
    format!("{}{id:04}", &collection.as_str()[..3])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub collection: Collection,
    pub key: Option<String>,
}

impl RecordedRequest {
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => format!("{} {} {key}", self.method, self.collection.as_str()),
            None => format!("{} {}", self.method, self.collection.as_str()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<Collection, Vec<Value>>,
    requests: Vec<RecordedRequest>,
    failing_keys: BTreeSet<String>,
    failing_lists: bool,
    token: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryEndpoint {
    state: Mutex<MemoryState>,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn demo(seed: u64) -> Self {
        let endpoint = Self::new().expect_token(DEMO_TOKEN);
        let mut faker = FleetFaker::new(seed);
        for (collection, count) in Collection::ALL.into_iter().zip([23, 14, 18, 31, 12, 4]) {
            endpoint.set_records(collection, faker.records(collection, count));
        }
        endpoint
    }

    pub fn with_records(self, collection: Collection, records: Vec<Value>) -> Self {
        self.set_records(collection, records);
        self
    }

    // Any other bearer token gets a 401.
    pub fn expect_token(self, token: &str) -> Self {
        self.lock().token = Some(token.to_owned());
        self
    }

    pub fn set_records(&self, collection: Collection, records: Vec<Value>) {
        self.lock().records.insert(collection, records);
    }

    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.lock()
            .records
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    // Mutations addressed to `key` answer 500.
    pub fn fail_key(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_owned());
    }

    pub fn fail_lists(&self, failing: bool) {
        self.lock().failing_lists = failing;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_labels(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(RecordedRequest::label)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(
        &self,
        method: &'static str,
        collection: Collection,
        key: Option<&str>,
        token: &str,
    ) -> Result<MutexGuard<'_, MemoryState>, RemoteError> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method,
            collection,
            key: key.map(str::to_owned),
        });
        if state.token.as_deref().is_some_and(|expected| expected != token) {
            return Err(RemoteError::Status {
                status: 401,
                message: "Missing or invalid credentials".to_owned(),
            });
        }
        if let Some(key) = key
            && method != "GET"
            && state.failing_keys.contains(key)
        {
            return Err(RemoteError::Status {
                status: 500,
                message: "Internal Server Error".to_owned(),
            });
        }
        Ok(state)
    }
}

fn matches_key(record: &Value, key: &str) -> bool {
    let id = record.get("id").map(|id| match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });
    let document_id = record.get("documentId").and_then(Value::as_str);
    id.as_deref() == Some(key) || document_id == Some(key)
}

fn not_found() -> RemoteError {
    RemoteError::Status {
        status: 404,
        message: "Not Found".to_owned(),
    }
}

impl CollectionEndpoint for MemoryEndpoint {
    fn list(&self, collection: Collection, token: &str) -> Result<Vec<Value>, RemoteError> {
        let state = self.begin("GET", collection, None, token)?;
        if state.failing_lists {
            return Err(RemoteError::Status {
                status: 503,
                message: "Service Unavailable".to_owned(),
            });
        }
        Ok(state.records.get(&collection).cloned().unwrap_or_default())
    }

    fn get(&self, collection: Collection, key: &str, token: &str) -> Result<Value, RemoteError> {
        let state = self.begin("GET", collection, Some(key), token)?;
        state
            .records
            .get(&collection)
            .and_then(|records| records.iter().find(|record| matches_key(record, key)))
            .cloned()
            .ok_or_else(not_found)
    }

    fn create(
        &self,
        collection: Collection,
        record: &Map<String, Value>,
        token: &str,
    ) -> Result<Value, RemoteError> {
        let mut state = self.begin("POST", collection, None, token)?;
        let records = state.records.entry(collection).or_default();
        let id = records
            .iter()
            .filter_map(|record| record.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1;

        let mut created = record.clone();
        created.insert("id".to_owned(), json!(id));
        if collection.mutation_key() == MutationKey::DocumentId {
            created.insert("documentId".to_owned(), json!(document_id(collection, id)));
        }
        let created = Value::Object(created);
        records.push(created.clone());
        Ok(created)
    }

    fn update(
        &self,
        collection: Collection,
        key: &str,
        record: &Map<String, Value>,
        token: &str,
    ) -> Result<Value, RemoteError> {
        let mut state = self.begin("PUT", collection, Some(key), token)?;
        let stored = state
            .records
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|stored| matches_key(stored, key)))
            .ok_or_else(not_found)?;
        if let Value::Object(fields) = stored {
            for (field, value) in record {
                fields.insert(field.clone(), value.clone());
            }
        }
        Ok(stored.clone())
    }

    fn delete(&self, collection: Collection, key: &str, token: &str) -> Result<(), RemoteError> {
        let mut state = self.begin("DELETE", collection, Some(key), token)?;
        let records = state.records.entry(collection).or_default();
        let before = records.len();
        records.retain(|record| !matches_key(record, key));
        if records.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}

#[cfg(test)]
mod tests {
    use super::{DEMO_TOKEN, FleetFaker, MemoryEndpoint, temp_config_path};
    use fleetdesk_app::{Collection, CollectionEndpoint, RemoteError, normalize_rows};
    use serde_json::{Map, json};

    #[test]
    fn same_seed_same_records() {
        for collection in Collection::ALL {
            let left = FleetFaker::new(42).records(collection, 5);
            let right = FleetFaker::new(42).records(collection, 5);
            assert_eq!(left, right, "{}", collection.as_str());
        }
    }

    #[test]
    fn variety_across_seeds() {
        let plates = (1_u64..20)
            .map(|seed| FleetFaker::new(seed).record(Collection::Vehicles, 1)["plate"].to_string())
            .collect::<std::collections::BTreeSet<_>>();
        assert!(plates.len() > 10);
    }

    #[test]
    fn fixtures_normalize_without_dropping_rows() {
        let mut faker = FleetFaker::new(7);
        for collection in Collection::ALL {
            let batch = normalize_rows(collection, faker.records(collection, 40));
            assert_eq!(batch.rows.len(), 40, "{}", collection.as_str());
            assert!(batch.issues.is_empty(), "{:?}", batch.issues);
        }
    }

    #[test]
    fn content_collections_carry_document_ids() {
        let record = FleetFaker::new(3).record(Collection::Vehicles, 12);
        assert_eq!(record["documentId"], json!("veh0012"));
        let record = FleetFaker::new(3).record(Collection::Users, 12);
        assert!(record.get("documentId").is_none());
    }

    #[test]
    fn demo_endpoint_counts_requests_and_checks_the_token() {
        let endpoint = MemoryEndpoint::demo(1);
        let vehicles = endpoint
            .list(Collection::Vehicles, DEMO_TOKEN)
            .expect("demo token accepted");
        assert_eq!(vehicles.len(), 18);

        let error = endpoint
            .list(Collection::Vehicles, "stolen")
            .expect_err("wrong token rejected");
        assert!(matches!(error, RemoteError::Status { status: 401, .. }));
        assert_eq!(endpoint.request_labels(), vec!["GET vehicles", "GET vehicles"]);
    }

    #[test]
    fn mutations_change_the_stored_records() {
        let endpoint = MemoryEndpoint::new().with_records(
            Collection::Roles,
            vec![json!({ "id": 1, "name": "Public" }), json!({ "id": 2, "name": "Admin" })],
        );

        let mut patch = Map::new();
        patch.insert("name".to_owned(), json!("Auditor"));
        let updated = endpoint
            .update(Collection::Roles, "2", &patch, "any")
            .expect("update");
        assert_eq!(updated["name"], json!("Auditor"));

        let created = endpoint
            .create(Collection::Roles, &patch, "any")
            .expect("create");
        assert_eq!(created["id"], json!(3));

        endpoint
            .delete(Collection::Roles, "1", "any")
            .expect("delete");
        let error = endpoint
            .delete(Collection::Roles, "1", "any")
            .expect_err("already gone");
        assert!(error.to_string().contains("404"));
        assert_eq!(endpoint.records(Collection::Roles).len(), 2);
    }

    #[test]
    fn injected_failures_hit_only_their_key() {
        let endpoint = MemoryEndpoint::new().with_records(
            Collection::Vehicles,
            vec![
                json!({ "id": 1, "documentId": "veh0001" }),
                json!({ "id": 2, "documentId": "veh0002" }),
            ],
        );
        endpoint.fail_key("veh0002");

        endpoint
            .delete(Collection::Vehicles, "veh0001", "any")
            .expect("healthy key");
        let error = endpoint
            .delete(Collection::Vehicles, "veh0002", "any")
            .expect_err("injected failure");
        assert!(matches!(error, RemoteError::Status { status: 500, .. }));
        endpoint
            .get(Collection::Vehicles, "veh0002", "any")
            .expect("reads still work");

        endpoint.fail_lists(true);
        endpoint
            .list(Collection::Vehicles, "any")
            .expect_err("list failure injected");
    }

    #[test]
    fn temp_config_path_is_inside_the_scratch_dir() {
        let (dir, path) = temp_config_path().expect("temp dir");
        assert!(path.starts_with(dir.path()));
        assert!(!path.exists());
    }
}
