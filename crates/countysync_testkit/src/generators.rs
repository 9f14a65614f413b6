//! Deterministic parcel data generation.
//!
//! Generates synthetic county parcel records with realistic attribute
//! distributions and parcel-sized polygons, seeded for reproducibility.
//! The same seed always produces the same batch, so tests can assert
//! on exact change counts across generated revisions.

use countysync_model::{Geometry, Record, RecordBatch, Ring, Schema};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Land use codes assigned to generated parcels.
pub const USE_CODES: [&str; 5] = ["RES", "COM", "IND", "AGR", "VAC"];

const OWNERS: [&str; 8] = [
    "Alice Hartman",
    "Robert Chen",
    "Maria Delgado",
    "James Whitfield",
    "Priya Natarajan",
    "Samuel Okafor",
    "Linda Kowalski",
    "Hector Ramirez",
];

const CITIES: [&str; 5] = [
    "Springfield",
    "Riverdale",
    "Oak Valley",
    "Pine Hill",
    "Cedar Creek",
];

const ZONING_CODES: [&str; 7] = ["R1", "R2", "C1", "C2", "M1", "AG", "PD"];

const STREETS: [&str; 6] = [
    "Main St",
    "Oak Ave",
    "Maple Dr",
    "Washington Blvd",
    "Lincoln Way",
    "River Rd",
];

const BASE_LAT: f64 = 37.0;
const BASE_LON: f64 = -122.0;

/// Seeded generator of parcel record batches.
///
/// Besides fresh batches, the generator can evolve an existing set of
/// records into a "next day" revision with controlled fractions of
/// updates, deletions, and additions.
pub struct ParcelGenerator {
    rng: StdRng,
    next_id: u64,
}

impl ParcelGenerator {
    /// Creates a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: 1,
        }
    }

    /// Generates `count` fresh parcel records.
    pub fn records(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.record()).collect()
    }

    /// Generates a validated batch of `count` fresh parcels.
    pub fn batch(&mut self, count: usize) -> RecordBatch {
        RecordBatch::validate(Schema::parcel_default(), self.records(count))
    }

    /// Generates one parcel record.
    pub fn record(&mut self) -> Record {
        let id = self.next_id;
        self.next_id += 1;

        let acres = f64::from(self.rng.gen_range(10..=1000)) / 100.0;
        let use_code = USE_CODES[self.rng.gen_range(0..USE_CODES.len())];
        let street_number = self.rng.gen_range(100..9999);
        let street = STREETS[self.rng.gen_range(0..STREETS.len())];

        Record::new(format!("P-{id:05}"))
            .with_attr("owner", OWNERS[self.rng.gen_range(0..OWNERS.len())])
            .with_attr("use_code", use_code)
            .with_attr("acres", acres)
            .with_attr(
                "assessed_value",
                self.rng.gen_range(100_000i64..2_000_000),
            )
            .with_attr("address", format!("{street_number} {street}"))
            .with_attr("city", CITIES[self.rng.gen_range(0..CITIES.len())])
            .with_attr(
                "zoning_code",
                ZONING_CODES[self.rng.gen_range(0..ZONING_CODES.len())],
            )
            .with_attr("year_built", self.rng.gen_range(1950i64..2024))
            .with_geometry(self.parcel_geometry(acres))
    }

    /// Evolves `previous` into a new revision.
    ///
    /// Roughly `update_fraction` of the surviving records get a new
    /// owner and assessed value, `delete_fraction` are dropped, and
    /// `additions` fresh records are appended. Keys of surviving
    /// records are preserved.
    pub fn evolve(
        &mut self,
        previous: &[Record],
        update_fraction: f64,
        delete_fraction: f64,
        additions: usize,
    ) -> Vec<Record> {
        let mut next = Vec::with_capacity(previous.len() + additions);
        for record in previous {
            if self.rng.gen_bool(delete_fraction.clamp(0.0, 1.0)) {
                continue;
            }
            let mut record = record.clone();
            if self.rng.gen_bool(update_fraction.clamp(0.0, 1.0)) {
                record = record
                    .with_attr("owner", OWNERS[self.rng.gen_range(0..OWNERS.len())])
                    .with_attr(
                        "assessed_value",
                        self.rng.gen_range(100_000i64..2_000_000),
                    );
            }
            next.push(record);
        }
        for _ in 0..additions {
            next.push(self.record());
        }
        next
    }

    /// A parcel-sized polygon near the base coordinates. Most parcels
    /// are rectangles; the rest are irregular hexagons.
    fn parcel_geometry(&mut self, acres: f64) -> Geometry {
        let center_lat = BASE_LAT + self.rng.gen_range(-0.5..0.5);
        let center_lon = BASE_LON + self.rng.gen_range(-0.5..0.5);
        let scale = 0.001 * acres.sqrt();

        let ring = if self.rng.gen_bool(0.7) {
            Ring(vec![
                (center_lon - scale, center_lat - scale),
                (center_lon + scale, center_lat - scale),
                (center_lon + scale, center_lat + scale),
                (center_lon - scale, center_lat + scale),
            ])
        } else {
            let mut vertices = Vec::with_capacity(6);
            for i in 0..6 {
                let angle = f64::from(i) * (std::f64::consts::TAU / 6.0);
                let r = scale * self.rng.gen_range(0.8..1.2);
                vertices.push((center_lon + r * angle.cos(), center_lat + r * angle.sin()));
            }
            Ring(vertices)
        };
        Geometry::Polygon { rings: vec![ring] }
    }
}
