//! Database seeder for rate chart development and testing.
//!
//! Seeds demo societies with collection machines and installs a sample cow
//! milk chart shared by the first two societies.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use ratechart_core::ratechart::{Channel, RateChartService, UploadInput, UploadPolicy};
use ratechart_db::{
    RateChartRepository,
    entities::{machines, societies},
};
use ratechart_shared::types::SocietyId;

/// Demo societies and the machine codes registered to each.
const SOCIETIES: &[(&str, &[&str])] = &[
    ("Greenfield Milk Society", &["GF-01", "GF-02"]),
    ("Riverside Dairy Cooperative", &["RS-01"]),
    ("Hilltop Producers Union", &["HT-01", "HT-02", "HT-03"]),
];

const SAMPLE_CHART: &str = "\
CLR,FAT,SNF,RATE
26.0,3.5,8.5,32.50
27.0,4.0,8.7,35.00
28.0,4.5,8.9,37.50
29.0,5.0,9.1,40.00
";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    println!("Connecting to database...");
    let db = ratechart_db::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    println!("Seeding societies and machines...");
    let mut society_ids = Vec::with_capacity(SOCIETIES.len());
    for (name, machine_codes) in SOCIETIES {
        let society_id = seed_society(&db, name).await;
        for code in *machine_codes {
            seed_machine(&db, society_id, code).await;
        }
        society_ids.push(society_id);
    }

    println!("Seeding sample rate chart...");
    seed_sample_chart(&db, society_ids[..2].to_vec()).await;

    println!("Seeding complete!");
}

/// Returns the society with this name, creating it if needed.
async fn seed_society(db: &DatabaseConnection, name: &str) -> SocietyId {
    if let Some(existing) = societies::Entity::find()
        .filter(societies::Column::Name.eq(name))
        .one(db)
        .await
        .expect("Failed to query societies")
    {
        println!("  Society '{name}' already exists, skipping...");
        return SocietyId::new(existing.id);
    }

    let society = societies::ActiveModel {
        name: Set(name.to_string()),
        created_at: Set(chrono::Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert society");

    println!("  Created society '{name}' ({})", society.id);
    SocietyId::new(society.id)
}

async fn seed_machine(db: &DatabaseConnection, society_id: SocietyId, code: &str) {
    let exists = machines::Entity::find()
        .filter(machines::Column::SocietyId.eq(society_id.into_inner()))
        .filter(machines::Column::MachineCode.eq(code))
        .one(db)
        .await
        .expect("Failed to query machines")
        .is_some();
    if exists {
        return;
    }

    machines::ActiveModel {
        society_id: Set(society_id.into_inner()),
        machine_code: Set(code.to_string()),
        created_at: Set(chrono::Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert machine");

    println!("  Created machine {code} for society {society_id}");
}

/// Uploads the sample chart; re-running replaces the previous sample.
async fn seed_sample_chart(db: &DatabaseConnection, society_ids: Vec<SocietyId>) {
    let service = RateChartService::new(
        Arc::new(RateChartRepository::new(db.clone())),
        UploadPolicy::default(),
    );

    let result = service
        .upload(UploadInput {
            file_name: "sample_cow.csv".to_string(),
            content: SAMPLE_CHART.as_bytes().to_vec(),
            society_ids,
            channel: Channel::Cow,
            uploaded_by: "seeder".to_string(),
        })
        .await
        .expect("Failed to upload sample chart");

    println!(
        "  Master chart {} with {} rows shared by {} societies",
        result.master_chart_id, result.record_count, result.society_count
    );
}
