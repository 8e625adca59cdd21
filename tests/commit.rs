//! Committing holds into bookings, replays, rollback and cancellation.

mod common;

use chrono::Duration;
use rust_decimal::Decimal;

use cinema_seating::error::{RepositoryError, ReservationError};
use cinema_seating::models::{AdminStatus, BookingStatus, HoldToken, SeatId, SeatState};
use cinema_seating::repository::Catalog;
use common::{ids, Fixture, SHOWTIME_ID, TOTAL_SEATS};

async fn seat_state(fx: &Fixture, id: &str) -> SeatState {
    fx.state.ledger.availability(SHOWTIME_ID).await.unwrap()[&SeatId::new(id)]
}

async fn available_count(fx: &Fixture) -> i32 {
    fx.store
        .showtime(SHOWTIME_ID)
        .await
        .unwrap()
        .unwrap()
        .showtime
        .available_seats_count
}

#[tokio::test]
async fn commit_books_the_held_seats() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["H1", "H2"]), 7).await.unwrap();

    let committed = fx.state.bookings.commit(hold.hold_token, 7).await.unwrap();
    assert!(!committed.is_replay());

    let booking = committed.booking();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.user_id, 7);
    assert_eq!(booking.seat_ids, ids(&["H1", "H2"]));
    // 100000 base x 2.0 couple multiplier, per seat
    assert_eq!(booking.total_price, Decimal::new(400_000, 0));

    let availability = fx.state.ledger.availability(SHOWTIME_ID).await.unwrap();
    assert_eq!(availability[&SeatId::new("H1")], SeatState::Booked);
    assert_eq!(availability[&SeatId::new("H2")], SeatState::Booked);
    assert_eq!(available_count(&fx).await, TOTAL_SEATS as i32 - 2);
    assert_eq!(fx.store.booking_count(), 1);
}

#[tokio::test]
async fn mixed_selection_is_priced_per_seat() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1", "B1"]), 1).await.unwrap();
    let booking = fx.state.bookings.commit(hold.hold_token, 1).await.unwrap().into_booking();
    assert_eq!(booking.total_price, Decimal::new(250_000, 0));
}

#[tokio::test]
async fn second_commit_returns_the_same_booking() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();

    let first = fx.state.bookings.commit(hold.hold_token, 1).await.unwrap();
    let second = fx.state.bookings.commit(hold.hold_token, 1).await.unwrap();

    assert!(second.is_replay());
    assert_eq!(first.booking(), second.booking());
    assert_eq!(fx.store.booking_count(), 1);
    assert_eq!(available_count(&fx).await, TOTAL_SEATS as i32 - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_commits_create_one_booking() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1", "A2"]), 1).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let bookings = fx.state.bookings.clone();
        let token = hold.hold_token;
        tasks.push(tokio::spawn(async move { bookings.commit(token, 1).await }));
    }

    let mut created = 0;
    let mut booking_ids = Vec::new();
    for task in tasks {
        let committed = task.await.unwrap().unwrap();
        if !committed.is_replay() {
            created += 1;
        }
        booking_ids.push(committed.booking().id);
    }
    assert_eq!(created, 1);
    booking_ids.dedup();
    assert_eq!(booking_ids.len(), 1);
    assert_eq!(fx.store.booking_count(), 1);
}

#[tokio::test]
async fn commit_survives_a_restart() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["B1", "B2"]), 3).await.unwrap();
    let original = fx.state.bookings.commit(hold.hold_token, 3).await.unwrap().into_booking();

    let restarted = fx.restart();
    let replay = restarted.bookings.commit(hold.hold_token, 3).await.unwrap();
    assert!(replay.is_replay());
    assert_eq!(replay.booking().id, original.id);

    let availability = restarted.ledger.availability(SHOWTIME_ID).await.unwrap();
    assert_eq!(availability[&SeatId::new("B1")], SeatState::Booked);
    assert!(matches!(
        restarted.ledger.hold(SHOWTIME_ID, &ids(&["B2"]), 4).await,
        Err(ReservationError::SeatsUnavailable(_))
    ));
}

#[tokio::test]
async fn commit_after_expiry_fails_and_frees_seats() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();

    fx.clock.advance(Duration::minutes(5));
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 1).await,
        Err(ReservationError::HoldExpired(_))
    ));
    assert_eq!(fx.store.booking_count(), 0);

    let availability = fx.state.ledger.availability(SHOWTIME_ID).await.unwrap();
    assert_eq!(availability[&SeatId::new("A1")], SeatState::Free);
}

#[tokio::test]
async fn swept_hold_is_reported_expired_until_forgotten() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();

    fx.clock.advance(Duration::minutes(6));
    fx.state.ledger.sweep_expired().await;
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 1).await,
        Err(ReservationError::HoldExpired(_))
    ));

    fx.clock.advance(Duration::minutes(11));
    fx.state.ledger.sweep_expired().await;
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 1).await,
        Err(ReservationError::HoldNotFound(_))
    ));
}

#[tokio::test]
async fn unknown_and_released_tokens_are_not_found() {
    let fx = Fixture::new();
    assert!(matches!(
        fx.state.bookings.commit(HoldToken::generate(), 1).await,
        Err(ReservationError::HoldNotFound(_))
    ));

    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();
    fx.state.ledger.release(hold.hold_token, 1).await.unwrap();
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 1).await,
        Err(ReservationError::HoldNotFound(_))
    ));
}

#[tokio::test]
async fn only_the_holder_can_commit() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();

    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 2).await,
        Err(ReservationError::HoldOwnedByOtherUser(_))
    ));
    fx.state.bookings.commit(hold.hold_token, 1).await.unwrap();
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 2).await,
        Err(ReservationError::HoldOwnedByOtherUser(_))
    ));
}

#[tokio::test]
async fn failed_transaction_leaves_the_hold_intact() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["H3", "H4"]), 1).await.unwrap();

    fx.store.fail_next_write();
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 1).await,
        Err(ReservationError::Repository(RepositoryError::Database(_)))
    ));
    assert_eq!(fx.store.booking_count(), 0);
    assert_eq!(available_count(&fx).await, TOTAL_SEATS as i32);

    let availability = fx.state.ledger.availability(SHOWTIME_ID).await.unwrap();
    assert_eq!(availability[&SeatId::new("H3")], SeatState::Held);

    let committed = fx.state.bookings.commit(hold.hold_token, 1).await.unwrap();
    assert!(!committed.is_replay());
}

#[tokio::test]
async fn canceled_showtime_rejects_commit() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();

    fx.store.set_admin_status(SHOWTIME_ID, AdminStatus::Canceled);
    assert!(matches!(
        fx.state.bookings.commit(hold.hold_token, 1).await,
        Err(ReservationError::ShowtimeNotBookable { .. })
    ));
    assert_eq!(fx.store.booking_count(), 0);
}

#[tokio::test]
async fn cancel_returns_seats_to_sale() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1", "A2"]), 5).await.unwrap();
    let booking = fx.state.bookings.commit(hold.hold_token, 5).await.unwrap().into_booking();

    assert!(matches!(
        fx.state.bookings.cancel_booking(booking.id, 6).await,
        Err(ReservationError::BookingOwnedByOtherUser(_))
    ));

    let cancelled = fx.state.bookings.cancel_booking(booking.id, 5).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(available_count(&fx).await, TOTAL_SEATS as i32);

    let availability = fx.state.ledger.availability(SHOWTIME_ID).await.unwrap();
    assert_eq!(availability[&SeatId::new("A1")], SeatState::Free);

    assert!(matches!(
        fx.state.bookings.cancel_booking(booking.id, 5).await,
        Err(ReservationError::BookingNotCancellable(_))
    ));

    fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1", "A2"]), 6).await.unwrap();
}

#[tokio::test]
async fn lists_bookings_of_a_user_newest_first() {
    let fx = Fixture::new();
    let first = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();
    fx.state.bookings.commit(first.hold_token, 1).await.unwrap();

    fx.clock.advance(Duration::minutes(1));
    let second = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A2"]), 1).await.unwrap();
    let latest = fx.state.bookings.commit(second.hold_token, 1).await.unwrap().into_booking();

    let other = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A3"]), 2).await.unwrap();
    fx.state.bookings.commit(other.hold_token, 2).await.unwrap();

    let listed = fx.state.bookings.bookings_for_user(1).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, latest.id);

    assert!(matches!(
        fx.state.bookings.find_booking(uuid::Uuid::new_v4()).await,
        Err(ReservationError::BookingNotFound(_))
    ));
}

#[tokio::test]
async fn sweep_never_frees_booked_seats() {
    let fx = Fixture::new();
    let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["H1", "H2"]), 1).await.unwrap();
    fx.state.bookings.commit(hold.hold_token, 1).await.unwrap();

    fx.clock.advance(Duration::minutes(6));
    let stats = fx.state.ledger.sweep_expired().await;
    assert_eq!(stats.holds_expired, 0);
    assert_eq!(stats.seats_freed, 0);

    assert_eq!(seat_state(&fx, "H1").await, SeatState::Booked);
    assert_eq!(seat_state(&fx, "H2").await, SeatState::Booked);
    assert_eq!(available_count(&fx).await, TOTAL_SEATS as i32 - 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_racing_commit_at_expiry_never_splits_the_outcome() {
    let fx = Fixture::new();

    for seat in ["A1", "A2", "A3", "A4", "B1", "B2"] {
        let hold = fx.state.ledger.hold(SHOWTIME_ID, &ids(&[seat]), 1).await.unwrap();
        fx.clock.advance(Duration::minutes(5) - Duration::milliseconds(1));

        let ledger = fx.state.ledger.clone();
        let sweeper = tokio::spawn(async move {
            for _ in 0..4 {
                ledger.sweep_expired().await;
                tokio::task::yield_now().await;
            }
        });
        let bookings = fx.state.bookings.clone();
        let committer = tokio::spawn(async move { bookings.commit(hold.hold_token, 1).await });
        fx.clock.advance(Duration::milliseconds(1));

        let outcome = committer.await.unwrap();
        sweeper.await.unwrap();

        match outcome {
            Ok(committed) => {
                assert!(!committed.is_replay());
                assert_eq!(seat_state(&fx, seat).await, SeatState::Booked);
            }
            Err(ReservationError::HoldExpired(_)) => {
                assert_eq!(seat_state(&fx, seat).await, SeatState::Free);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let booked = fx.store.booking_count() as i32;
    assert_eq!(available_count(&fx).await, TOTAL_SEATS as i32 - booked);
}

#[tokio::test]
async fn replayed_booking_matches_the_committed_one_exactly() {
    let fx = Fixture::new();
    let mut info = common::showtime(12, AdminStatus::Active);
    info.showtime.base_price = Decimal::new(9_999, 2);
    fx.store.insert_showtime(info);
    fx.clock.advance(Duration::nanoseconds(123_456_789));

    let hold = fx.state.ledger.hold(12, &ids(&["B1"]), 1).await.unwrap();
    let created = fx.state.bookings.commit(hold.hold_token, 1).await.unwrap().into_booking();
    // 99.99 x 1.5 = 149.985
    assert_eq!(created.total_price, Decimal::new(14_999, 2));
    assert_eq!(created.created_at.timestamp_subsec_nanos() % 1_000, 0);

    let replayed = fx.restart().bookings.commit(hold.hold_token, 1).await.unwrap();
    assert!(replayed.is_replay());
    assert_eq!(replayed.into_booking(), created);
}

#[tokio::test]
async fn seat_sold_elsewhere_answers_seats_unavailable() {
    let fx = Fixture::new();
    let mine = fx.state.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 1).await.unwrap();

    // A second node that loaded the showtime before the sale.
    let other = fx.restart();
    let theirs = other.ledger.hold(SHOWTIME_ID, &ids(&["A1"]), 2).await.unwrap();
    other.bookings.commit(theirs.hold_token, 2).await.unwrap();

    let err = fx.state.bookings.commit(mine.hold_token, 1).await.unwrap_err();
    assert!(matches!(err, ReservationError::SeatsUnavailable(ref seats) if *seats == ids(&["A1"])));
    assert_eq!(err.status().as_u16(), 419);
    assert_eq!(fx.store.booking_count(), 1);
}
