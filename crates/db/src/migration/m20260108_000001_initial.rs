//! Initial database migration.
//!
//! Creates the society/machine reference tables, the rate chart tables,
//! download tracking, and the triggers that keep chart groups one level deep.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: REFERENCE TABLES
        // ============================================================
        db.execute_unprepared(SOCIETIES_SQL).await?;
        db.execute_unprepared(MACHINES_SQL).await?;

        // ============================================================
        // PART 3: RATE CHARTS
        // ============================================================
        db.execute_unprepared(CHART_HEADERS_SQL).await?;
        db.execute_unprepared(CHART_DATA_ROWS_SQL).await?;

        // ============================================================
        // PART 4: DOWNLOAD TRACKING
        // ============================================================
        db.execute_unprepared(MACHINE_DOWNLOAD_RECORDS_SQL).await?;

        // ============================================================
        // PART 5: TRIGGERS & FUNCTIONS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
-- Milk channel a chart prices
CREATE TYPE milk_channel AS ENUM ('COW', 'BUFFALO', 'MIXED');

-- Chart status, shared by every header of a group
CREATE TYPE chart_status AS ENUM ('active', 'inactive');
";

const SOCIETIES_SQL: &str = r"
CREATE TABLE societies (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const MACHINES_SQL: &str = r"
CREATE TABLE machines (
    id BIGSERIAL PRIMARY KEY,
    society_id BIGINT NOT NULL REFERENCES societies(id) ON DELETE CASCADE,
    machine_code VARCHAR(64) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_machines_society_code UNIQUE (society_id, machine_code)
);

CREATE INDEX idx_machines_society ON machines(society_id);
";

const CHART_HEADERS_SQL: &str = r"
CREATE TABLE chart_headers (
    id BIGSERIAL PRIMARY KEY,
    society_id BIGINT NOT NULL REFERENCES societies(id),
    channel milk_channel NOT NULL,
    status chart_status NOT NULL DEFAULT 'active',
    -- NULL for the master; otherwise the master whose rows this header serves
    shared_chart_id BIGINT REFERENCES chart_headers(id) ON DELETE RESTRICT,
    file_name VARCHAR(255) NOT NULL,
    uploaded_by VARCHAR(255) NOT NULL,
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    record_count BIGINT NOT NULL DEFAULT 0,

    CONSTRAINT chk_chart_not_self_shared CHECK (shared_chart_id IS NULL OR shared_chart_id <> id),
    CONSTRAINT chk_chart_record_count CHECK (record_count >= 0),
    CONSTRAINT uq_chart_headers_society_channel UNIQUE (society_id, channel)
);

CREATE INDEX idx_chart_headers_shared ON chart_headers(shared_chart_id)
    WHERE shared_chart_id IS NOT NULL;
";

const CHART_DATA_ROWS_SQL: &str = r"
CREATE TABLE chart_data_rows (
    id BIGSERIAL PRIMARY KEY,
    chart_id BIGINT NOT NULL REFERENCES chart_headers(id) ON DELETE RESTRICT,
    clr NUMERIC(10, 2) NOT NULL,
    fat NUMERIC(10, 2) NOT NULL,
    snf NUMERIC(10, 2) NOT NULL,
    rate NUMERIC(10, 2) NOT NULL
);

CREATE INDEX idx_chart_data_rows_chart ON chart_data_rows(chart_id);
";

const MACHINE_DOWNLOAD_RECORDS_SQL: &str = r"
CREATE TABLE machine_download_records (
    machine_id BIGINT NOT NULL REFERENCES machines(id) ON DELETE CASCADE,
    chart_id BIGINT NOT NULL REFERENCES chart_headers(id) ON DELETE CASCADE,
    downloaded BOOLEAN NOT NULL DEFAULT false,
    downloaded_at TIMESTAMPTZ,

    PRIMARY KEY (machine_id, chart_id)
);

CREATE INDEX idx_machine_download_records_chart ON machine_download_records(chart_id);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: enforce_master_reference
-- A header may only point at a master, never at another reference
-- ============================================================
CREATE OR REPLACE FUNCTION enforce_master_reference()
RETURNS TRIGGER AS $$
DECLARE
    target_shared BIGINT;
BEGIN
    IF NEW.shared_chart_id IS NULL THEN
        RETURN NEW;
    END IF;

    SELECT shared_chart_id INTO target_shared
    FROM chart_headers
    WHERE id = NEW.shared_chart_id;

    IF target_shared IS NOT NULL THEN
        RAISE EXCEPTION 'Chart % cannot reference chart %, which is itself a reference',
            NEW.id, NEW.shared_chart_id;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_enforce_master_reference
BEFORE INSERT OR UPDATE OF shared_chart_id ON chart_headers
FOR EACH ROW
EXECUTE FUNCTION enforce_master_reference();

-- ============================================================
-- FUNCTION: enforce_rows_on_master
-- Data rows belong to master headers only
-- ============================================================
CREATE OR REPLACE FUNCTION enforce_rows_on_master()
RETURNS TRIGGER AS $$
BEGIN
    IF EXISTS (
        SELECT 1 FROM chart_headers
        WHERE id = NEW.chart_id AND shared_chart_id IS NOT NULL
    ) THEN
        RAISE EXCEPTION 'Data rows must belong to a master chart, got %', NEW.chart_id;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_enforce_rows_on_master
BEFORE INSERT OR UPDATE OF chart_id ON chart_data_rows
FOR EACH ROW
EXECUTE FUNCTION enforce_rows_on_master();
";

const DROP_ALL_SQL: &str = r"
-- Drop triggers
DROP TRIGGER IF EXISTS trg_enforce_rows_on_master ON chart_data_rows;
DROP TRIGGER IF EXISTS trg_enforce_master_reference ON chart_headers;

-- Drop functions
DROP FUNCTION IF EXISTS enforce_rows_on_master();
DROP FUNCTION IF EXISTS enforce_master_reference();

-- Drop tables (reverse order of creation)
DROP TABLE IF EXISTS machine_download_records CASCADE;
DROP TABLE IF EXISTS chart_data_rows CASCADE;
DROP TABLE IF EXISTS chart_headers CASCADE;
DROP TABLE IF EXISTS machines CASCADE;
DROP TABLE IF EXISTS societies CASCADE;

-- Drop enums
DROP TYPE IF EXISTS chart_status CASCADE;
DROP TYPE IF EXISTS milk_channel CASCADE;
";
