use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;
use voyage_booking::lifecycle::{self, CancelOrigin};
use voyage_booking::{
    Admission, Booking, BookingPolicy, BookingStatus, Cancellation, CancellationOutcome, ExpirySweep, Payment,
    PaymentSettlement, PaymentStatus, Promotion, Refund, ReservationError, ReservationStore, SettlementDecision,
    SettlementOutcome, StoreError, StoreResult, WaitingList, WaitingListEntry,
};
use voyage_catalog::Package;

const BOOKING_REFERENCE_KEY: &str = "bookings_booking_reference_key";
const LIVE_BOOKING_INDEX: &str = "bookings_live_user_package";
const WAITLIST_USER_PACKAGE_KEY: &str = "waiting_list_entries_user_package_key";

const LIVE_STATUSES: &str = "('PENDING', 'CONFIRMED')";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    name: String,
    price_cents: i64,
    discounted_price_cents: Option<i64>,
    discount_starts_at: Option<DateTime<Utc>>,
    discount_ends_at: Option<DateTime<Utc>>,
    available_rooms: i32,
    total_rooms: i32,
    is_active: bool,
    start_date: DateTime<Utc>,
    currency: String,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Package {
            id: row.id,
            name: row.name,
            price_cents: row.price_cents,
            discounted_price_cents: row.discounted_price_cents,
            discount_starts_at: row.discount_starts_at,
            discount_ends_at: row.discount_ends_at,
            available_rooms: to_u32(row.available_rooms),
            total_rooms: to_u32(row.total_rooms),
            is_active: row.is_active,
            start_date: row.start_date,
            currency: row.currency,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    package_id: Uuid,
    number_of_rooms: i32,
    number_of_guests: i32,
    total_price_cents: i64,
    status: String,
    booking_reference: String,
    booked_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            package_id: row.package_id,
            number_of_rooms: to_u32(row.number_of_rooms),
            number_of_guests: to_u32(row.number_of_guests),
            total_price_cents: row.total_price_cents,
            status: row.status.parse::<BookingStatus>().map_err(StoreError::Backend)?,
            booking_reference: row.booking_reference,
            booked_at: row.booked_at,
            confirmed_at: row.confirmed_at,
            cancelled_at: row.cancelled_at,
            cancellation_reason: row.cancellation_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_ids: Vec<Uuid>,
    amount_cents: i64,
    currency: String,
    status: String,
    method: String,
    transaction_id: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_ids: row.booking_ids,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status.parse::<PaymentStatus>().map_err(StoreError::Backend)?,
            method: row.method,
            transaction_id: row.transaction_id,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    user_id: Uuid,
    package_id: Uuid,
    number_of_rooms: i32,
    date_added: DateTime<Utc>,
    is_notified: bool,
    date_notified: Option<DateTime<Utc>>,
}

impl From<EntryRow> for WaitingListEntry {
    fn from(row: EntryRow) -> Self {
        WaitingListEntry {
            id: row.id,
            user_id: row.user_id,
            package_id: row.package_id,
            number_of_rooms: to_u32(row.number_of_rooms),
            position: 0,
            date_added: row.date_added,
            is_notified: row.is_notified,
            date_notified: row.date_notified,
        }
    }
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Map driver errors onto the store taxonomy.
///
/// Serialization failures and deadlocks become [`StoreError::Conflict`] so the caller retries
/// the whole unit of work.
fn db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("40001") | Some("40P01") => return StoreError::Conflict(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

/// Name of the violated unique constraint, if `err` is a unique violation.
fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            db.constraint().map(str::to_string)
        }
        _ => None,
    }
}

/// PostgreSQL-backed reservation store.
///
/// Every mutating operation runs in one `SERIALIZABLE` transaction. Rooms are taken with a
/// conditional update on `packages.available_rooms`, so the counter can never go negative even
/// if two transactions race past the pre-checks.
#[derive(Clone)]
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Ok(tx)
    }

    /// Register a package. Used by seeding and tests.
    pub async fn insert_package(&self, package: &Package) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO packages (id, name, price_cents, discounted_price_cents, discount_starts_at,
                                  discount_ends_at, available_rooms, total_rooms, is_active, start_date, currency)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(package.id)
        .bind(&package.name)
        .bind(package.price_cents)
        .bind(package.discounted_price_cents)
        .bind(package.discount_starts_at)
        .bind(package.discount_ends_at)
        .bind(to_i32(package.available_rooms))
        .bind(to_i32(package.total_rooms))
        .bind(package.is_active)
        .bind(package.start_date)
        .bind(&package.currency)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

async fn fetch_package(conn: &mut PgConnection, package_id: Uuid, lock: bool) -> StoreResult<Package> {
    let sql = if lock {
        "SELECT * FROM packages WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM packages WHERE id = $1"
    };
    let row: Option<PackageRow> = sqlx::query_as(sql)
        .bind(package_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    row.map(Package::from)
        .ok_or_else(|| ReservationError::not_found("package", package_id).into())
}

async fn fetch_booking_for_update(conn: &mut PgConnection, booking_id: Uuid) -> StoreResult<Booking> {
    let row: Option<BookingRow> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    match row {
        Some(row) => Booking::try_from(row),
        None => Err(ReservationError::not_found("booking", booking_id).into()),
    }
}

async fn fetch_payment_for_update(conn: &mut PgConnection, payment_id: Uuid) -> StoreResult<Payment> {
    let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    match row {
        Some(row) => Payment::try_from(row),
        None => Err(ReservationError::not_found("payment", payment_id).into()),
    }
}

/// Bookings covered by `ids`, in `ids` order. Missing ids are `NotFound`.
async fn fetch_bookings_for_update(conn: &mut PgConnection, ids: &[Uuid]) -> StoreResult<Vec<Booking>> {
    let rows: Vec<BookingRow> = sqlx::query_as("SELECT * FROM bookings WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;
    let mut bookings = rows
        .into_iter()
        .map(Booking::try_from)
        .collect::<StoreResult<Vec<_>>>()?;

    let mut ordered = Vec::with_capacity(ids.len());
    for id in ids {
        let index = bookings
            .iter()
            .position(|b| b.id == *id)
            .ok_or_else(|| StoreError::from(ReservationError::not_found("booking", *id)))?;
        ordered.push(bookings.swap_remove(index));
    }
    Ok(ordered)
}

async fn fetch_waiting_list(conn: &mut PgConnection, package_id: Uuid) -> StoreResult<WaitingList> {
    let rows: Vec<EntryRow> = sqlx::query_as(
        "SELECT * FROM waiting_list_entries WHERE package_id = $1 ORDER BY date_added, id",
    )
    .bind(package_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(WaitingList::from_entries(
        package_id,
        rows.into_iter().map(WaitingListEntry::from).collect(),
    ))
}

async fn count_live(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<u32> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND status IN {LIVE_STATUSES}"
    ))
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

async fn find_live_booking(conn: &mut PgConnection, user_id: Uuid, package_id: Uuid) -> StoreResult<Option<Booking>> {
    let row: Option<BookingRow> = sqlx::query_as(&format!(
        "SELECT * FROM bookings WHERE user_id = $1 AND package_id = $2 AND status IN {LIVE_STATUSES}"
    ))
    .bind(user_id)
    .bind(package_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;
    row.map(Booking::try_from).transpose()
}

/// Conditional decrement. `false` when fewer than `rooms + held` rooms remain.
async fn take_rooms(conn: &mut PgConnection, package_id: Uuid, rooms: u32, held: u32) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE packages
        SET available_rooms = available_rooms - $2
        WHERE id = $1 AND available_rooms - $3 >= $2
        "#,
    )
    .bind(package_id)
    .bind(to_i32(rooms))
    .bind(to_i32(held))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(result.rows_affected() == 1)
}

async fn release_rooms(conn: &mut PgConnection, package_id: Uuid, rooms: u32) -> StoreResult<()> {
    sqlx::query("UPDATE packages SET available_rooms = LEAST(available_rooms + $2, total_rooms) WHERE id = $1")
        .bind(package_id)
        .bind(to_i32(rooms))
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

async fn write_booking_status(conn: &mut PgConnection, booking: &Booking) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE bookings
        SET status = $2, confirmed_at = $3, cancelled_at = $4, cancellation_reason = $5
        WHERE id = $1
        "#,
    )
    .bind(booking.id)
    .bind(booking.status.as_str())
    .bind(booking.confirmed_at)
    .bind(booking.cancelled_at)
    .bind(&booking.cancellation_reason)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn write_payment_status(conn: &mut PgConnection, payment: &Payment) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = $2, transaction_id = $3, failure_reason = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(payment.status.as_str())
    .bind(&payment.transaction_id)
    .bind(&payment.failure_reason)
    .bind(payment.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

/// Notify as many front entries as the package's free, unheld rooms allow.
async fn promote(
    conn: &mut PgConnection,
    package_id: Uuid,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> StoreResult<Vec<Promotion>> {
    let package = fetch_package(conn, package_id, false).await?;
    let mut queue = fetch_waiting_list(conn, package_id).await?;

    let mut promotions = Vec::new();
    for entry in queue.promote_all(package.available_rooms, now, policy.hold_window()) {
        sqlx::query("UPDATE waiting_list_entries SET is_notified = TRUE, date_notified = $2 WHERE id = $1")
            .bind(entry.id)
            .bind(entry.date_notified)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        promotions.push(Promotion::new(entry, policy));
    }
    Ok(promotions)
}

async fn cancel_in_tx(
    conn: &mut PgConnection,
    booking_id: Uuid,
    origin: CancelOrigin,
    reason: Option<String>,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> StoreResult<CancellationOutcome> {
    let mut booking = fetch_booking_for_update(conn, booking_id).await?;
    let package = fetch_package(conn, booking.package_id, true).await?;

    lifecycle::cancel(&mut booking, package.start_date, origin, reason, policy, now)?;
    write_booking_status(conn, &booking).await?;
    release_rooms(conn, booking.package_id, booking.number_of_rooms).await?;

    let promotions = promote(conn, booking.package_id, policy, now).await?;
    Ok(CancellationOutcome { booking, promotions })
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn package(&self, package_id: Uuid) -> StoreResult<Option<Package>> {
        let row: Option<PackageRow> = sqlx::query_as("SELECT * FROM packages WHERE id = $1")
            .bind(package_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(Package::from))
    }

    async fn booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as("SELECT * FROM bookings WHERE user_id = $1 ORDER BY booked_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn count_active_bookings(&self, user_id: Uuid) -> StoreResult<u32> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        count_live(&mut conn, user_id).await
    }

    async fn live_booking(&self, user_id: Uuid, package_id: Uuid) -> StoreResult<Option<Booking>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        find_live_booking(&mut conn, user_id, package_id).await
    }

    async fn waiting_list(&self, package_id: Uuid) -> StoreResult<WaitingList> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        fetch_waiting_list(&mut conn, package_id).await
    }

    async fn payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(Payment::try_from).transpose()
    }

    async fn admit(&self, admission: Admission) -> StoreResult<Booking> {
        let Admission { booking, policy, now } = admission;
        let mut tx = self.begin().await?;

        let package = fetch_package(&mut tx, booking.package_id, true).await?;
        policy.ensure_bookable(&package, now)?;
        policy.ensure_below_cap(count_live(&mut tx, booking.user_id).await?, 1)?;
        if find_live_booking(&mut tx, booking.user_id, booking.package_id).await?.is_some() {
            return Err(ReservationError::DuplicateBooking(booking.package_id).into());
        }

        let window = policy.hold_window();
        let queue = fetch_waiting_list(&mut tx, booking.package_id).await?;
        let held = queue.held_rooms(now, window);
        let own_hold = queue.live_hold_for(booking.user_id, now, window);

        if !take_rooms(&mut tx, booking.package_id, booking.number_of_rooms, held).await? {
            if own_hold == 0
                || !take_rooms(&mut tx, booking.package_id, booking.number_of_rooms, held.saturating_sub(own_hold)).await?
            {
                return Err(ReservationError::FullyBooked(booking.package_id).into());
            }
            info!(
                "User {} booked package {} from their waiting-list hold",
                booking.user_id, booking.package_id
            );
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, package_id, number_of_rooms, number_of_guests, total_price_cents,
                                  status, booking_reference, booked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.package_id)
        .bind(to_i32(booking.number_of_rooms))
        .bind(to_i32(booking.number_of_guests))
        .bind(booking.total_price_cents)
        .bind(booking.status.as_str())
        .bind(&booking.booking_reference)
        .bind(booking.booked_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = inserted {
            return Err(match unique_violation(&err).as_deref() {
                Some(BOOKING_REFERENCE_KEY) => StoreError::ReferenceTaken(booking.booking_reference),
                Some(LIVE_BOOKING_INDEX) => ReservationError::DuplicateBooking(booking.package_id).into(),
                _ => db_error(err),
            });
        }

        sqlx::query("DELETE FROM waiting_list_entries WHERE user_id = $1 AND package_id = $2")
            .bind(booking.user_id)
            .bind(booking.package_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(booking)
    }

    async fn confirm_booking(&self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<Booking> {
        let mut tx = self.begin().await?;
        let mut booking = fetch_booking_for_update(&mut tx, booking_id).await?;
        lifecycle::confirm(&mut booking, now)?;
        write_booking_status(&mut tx, &booking).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(booking)
    }

    async fn complete_booking(&self, booking_id: Uuid) -> StoreResult<Booking> {
        let mut tx = self.begin().await?;
        let mut booking = fetch_booking_for_update(&mut tx, booking_id).await?;
        lifecycle::complete(&mut booking)?;
        write_booking_status(&mut tx, &booking).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(booking)
    }

    async fn cancel_booking(&self, cancellation: Cancellation) -> StoreResult<CancellationOutcome> {
        let mut tx = self.begin().await?;
        let outcome = cancel_in_tx(
            &mut tx,
            cancellation.booking_id,
            cancellation.origin,
            cancellation.reason,
            &cancellation.policy,
            cancellation.now,
        )
        .await?;
        tx.commit().await.map_err(db_error)?;
        Ok(outcome)
    }

    async fn join_waiting_list(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rooms: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<WaitingListEntry> {
        let mut tx = self.begin().await?;
        fetch_package(&mut tx, package_id, false).await?;
        let has_live_booking = find_live_booking(&mut tx, user_id, package_id).await?.is_some();
        let mut queue = fetch_waiting_list(&mut tx, package_id).await?;
        let entry = queue.join(user_id, rooms, has_live_booking, now)?.clone();

        let inserted = sqlx::query(
            r#"
            INSERT INTO waiting_list_entries (id, user_id, package_id, number_of_rooms, date_added, is_notified)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.package_id)
        .bind(to_i32(entry.number_of_rooms))
        .bind(entry.date_added)
        .execute(&mut *tx)
        .await;
        if let Err(err) = inserted {
            return Err(match unique_violation(&err).as_deref() {
                Some(WAITLIST_USER_PACKAGE_KEY) => ReservationError::AlreadyQueued(package_id).into(),
                _ => db_error(err),
            });
        }

        tx.commit().await.map_err(db_error)?;
        Ok(entry)
    }

    async fn leave_waiting_list(&self, user_id: Uuid, package_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM waiting_list_entries WHERE user_id = $1 AND package_id = $2")
            .bind(user_id)
            .bind(package_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_payment(&self, payment: Payment) -> StoreResult<Payment> {
        let mut tx = self.begin().await?;
        let bookings = fetch_bookings_for_update(&mut tx, &payment.booking_ids).await?;
        let has_live_payment: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM payments WHERE status IN ('PENDING', 'PROCESSING', 'COMPLETED') AND booking_ids && $1)",
        )
        .bind(&payment.booking_ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        lifecycle::ensure_payable(&bookings, has_live_payment)?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_ids, amount_cents, currency, status, method, transaction_id,
                                  failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(&payment.booking_ids)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.method)
        .bind(&payment.transaction_id)
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(payment)
    }

    async fn claim_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> StoreResult<Payment> {
        let mut tx = self.begin().await?;
        let mut payment = fetch_payment_for_update(&mut tx, payment_id).await?;
        lifecycle::claim_payment(&mut payment, now)?;
        write_payment_status(&mut tx, &payment).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(payment)
    }

    async fn release_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> StoreResult<Payment> {
        let mut tx = self.begin().await?;
        let mut payment = fetch_payment_for_update(&mut tx, payment_id).await?;
        lifecycle::release_payment(&mut payment, now)?;
        write_payment_status(&mut tx, &payment).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(payment)
    }

    async fn settle_payment(&self, settlement: PaymentSettlement) -> StoreResult<SettlementOutcome> {
        let PaymentSettlement { payment_id, decision, policy, now } = settlement;
        let mut tx = self.begin().await?;
        let mut payment = fetch_payment_for_update(&mut tx, payment_id).await?;
        let covered = fetch_bookings_for_update(&mut tx, &payment.booking_ids).await?;

        let mut bookings = Vec::new();
        let mut promotions = Vec::new();
        match decision {
            SettlementDecision::Approved { transaction_id } => {
                lifecycle::complete_payment(&mut payment, transaction_id, now)?;
                for mut booking in covered {
                    if booking.status != BookingStatus::Pending {
                        debug!("Booking {} is {}, not confirming", booking.id, booking.status);
                        continue;
                    }
                    lifecycle::confirm(&mut booking, now)?;
                    write_booking_status(&mut tx, &booking).await?;
                    bookings.push(booking);
                }
            }
            SettlementDecision::Declined { reason } => {
                lifecycle::fail_payment(&mut payment, reason.clone(), now)?;
                for booking in covered {
                    if booking.status != BookingStatus::Pending {
                        debug!("Booking {} is {}, not cancelling", booking.id, booking.status);
                        continue;
                    }
                    let outcome = cancel_in_tx(
                        &mut tx,
                        booking.id,
                        CancelOrigin::PaymentFailure,
                        Some(format!("payment declined: {reason}")),
                        &policy,
                        now,
                    )
                    .await?;
                    bookings.push(outcome.booking);
                    promotions.extend(outcome.promotions);
                }
            }
        }
        write_payment_status(&mut tx, &payment).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(SettlementOutcome { payment, bookings, promotions })
    }

    async fn refund_payment(&self, refund: Refund) -> StoreResult<SettlementOutcome> {
        let Refund { payment_id, reason, policy, now } = refund;
        let mut tx = self.begin().await?;
        let mut payment = fetch_payment_for_update(&mut tx, payment_id).await?;
        let covered = fetch_bookings_for_update(&mut tx, &payment.booking_ids).await?;
        lifecycle::refund_payment(&mut payment, now)?;

        let mut bookings = Vec::new();
        let mut promotions = Vec::new();
        for booking in covered.into_iter().filter(|b| b.is_live()) {
            let outcome = cancel_in_tx(&mut tx, booking.id, CancelOrigin::Refund, reason.clone(), &policy, now).await?;
            bookings.push(outcome.booking);
            promotions.extend(outcome.promotions);
        }
        write_payment_status(&mut tx, &payment).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(SettlementOutcome { payment, bookings, promotions })
    }

    async fn expire_holds(&self, policy: BookingPolicy, now: DateTime<Utc>) -> StoreResult<ExpirySweep> {
        let mut tx = self.begin().await?;
        let cutoff = now - policy.hold_window();
        let rows: Vec<EntryRow> = sqlx::query_as(
            "DELETE FROM waiting_list_entries WHERE is_notified AND date_notified <= $1 RETURNING *",
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut sweep = ExpirySweep {
            expired: rows.into_iter().map(WaitingListEntry::from).collect(),
            promotions: Vec::new(),
        };
        let packages: BTreeSet<Uuid> = sweep.expired.iter().map(|e| e.package_id).collect();
        for package_id in packages {
            sweep.promotions.extend(promote(&mut tx, package_id, &policy, now).await?);
        }

        tx.commit().await.map_err(db_error)?;
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_rejects_unknown_status() {
        let row = BookingRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            number_of_rooms: 2,
            number_of_guests: 2,
            total_price_cents: 1_000,
            status: "ON_HOLD".to_string(),
            booking_reference: "BK260101000000ABCDEF".to_string(),
            booked_at: Utc::now(),
            confirmed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        };
        assert!(matches!(Booking::try_from(row), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_claimed_payment_row_round_trips() {
        let now = Utc::now();
        let row = PaymentRow {
            id: Uuid::new_v4(),
            booking_ids: vec![Uuid::new_v4()],
            amount_cents: 12_000,
            currency: "EUR".to_string(),
            status: PaymentStatus::Processing.as_str().to_string(),
            method: "CARD".to_string(),
            transaction_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        let payment = Payment::try_from(row).unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert!(payment.status.is_live());
    }

    #[test]
    fn test_negative_counters_clamp_to_zero() {
        assert_eq!(to_u32(-1), 0);
        assert_eq!(to_u32(7), 7);
        assert_eq!(to_i32(u32::MAX), i32::MAX);
    }

    #[test]
    fn test_non_database_errors_are_backend_failures() {
        assert!(matches!(db_error(sqlx::Error::RowNotFound), StoreError::Backend(_)));
        assert_eq!(unique_violation(&sqlx::Error::PoolTimedOut), None);
    }
}
