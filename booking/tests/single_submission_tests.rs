//! Property tests: a held draft is submitted at most once, whatever order
//! session events arrive in.

use azurea_booking::{
    actions::BookingAction,
    config::FlowConfig,
    draft::{Amount, BookingDraft, BookingRequest, ContactDetails, IdentityDocument, RoomBookingRequest, RoomId},
    environment::BookingEnvironment,
    mocks::{MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator},
    reducers::BookingFlowReducer,
    state::{FlowState, Identity, Role, UserId, VerificationState},
};
use azurea_testing::{FixedClock, run_to_idle, test_clock, test_instant};
use chrono::NaiveDate;
use proptest::prelude::*;

type TestEnv = BookingEnvironment<MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator, FixedClock>;
type TestReducer = BookingFlowReducer<MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator, FixedClock>;

#[derive(Debug, Clone, Copy)]
enum SessionEvent {
    Check { signed_in: bool },
    Login,
    LoggedOut,
    Focus,
    Resubmit,
}

fn session_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        any::<bool>().prop_map(|signed_in| SessionEvent::Check { signed_in }),
        Just(SessionEvent::Login),
        Just(SessionEvent::LoggedOut),
        Just(SessionEvent::Focus),
        Just(SessionEvent::Resubmit),
    ]
}

fn guest() -> Identity {
    Identity {
        id: UserId(7),
        email: "guest@example.com".into(),
        first_name: "Ana".into(),
        last_name: "Reyes".into(),
        role: Role::Guest,
        verification: VerificationState::Verified,
    }
}

#[allow(clippy::unwrap_used)]
fn room_draft() -> BookingDraft {
    let request = BookingRequest::Room(RoomBookingRequest {
        room_id: RoomId(12),
        check_in: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        check_out: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
        arrival_time: None,
        number_of_guests: 2,
        contact: ContactDetails {
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            phone_number: "09171234567".into(),
            address: String::new(),
            special_requests: String::new(),
        },
        identity_document: IdentityDocument {
            file_name: "passport.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
        },
        total_price: Amount::from_major(5000),
    });
    BookingDraft::new(request, test_instant()).unwrap()
}

async fn apply(reducer: &TestReducer, state: &mut FlowState, env: &TestEnv, draft: &BookingDraft, event: SessionEvent) {
    let action = match event {
        SessionEvent::Check { signed_in } => {
            let epoch = state.session.begin_probe();
            BookingAction::SessionProbed {
                epoch,
                result: Ok(signed_in.then(guest)),
            }
        },
        SessionEvent::Login => BookingAction::LoginSucceeded { identity: guest() },
        SessionEvent::LoggedOut => BookingAction::LoggedOut,
        SessionEvent::Focus => BookingAction::WindowFocused,
        SessionEvent::Resubmit => BookingAction::submit(draft.clone()),
    };
    run_to_idle(reducer, state, env, action).await;
}

/// Returns how many bookings reached the server.
fn run_events(events: &[SessionEvent]) -> usize {
    tokio_test::block_on(async {
        let bookings = MockBookingApi::new();
        let env = BookingEnvironment::new(
            MockAuthApi::new(),
            bookings.clone(),
            MockStorage::new(),
            RecordingNavigator::new("/rooms/12"),
            test_clock(),
            FlowConfig::default(),
        );
        let reducer = TestReducer::new();
        let mut state = FlowState::default();
        let draft = room_draft();

        run_to_idle(&reducer, &mut state, &env, BookingAction::Boot).await;
        run_to_idle(&reducer, &mut state, &env, BookingAction::submit(draft.clone())).await;

        for event in events {
            apply(&reducer, &mut state, &env, &draft, *event).await;
        }

        let submitted = bookings.submissions();
        assert!(submitted.iter().all(|booking| booking.id() == draft.id()));
        submitted.len()
    })
}

proptest! {
    #[test]
    fn prop_held_draft_submits_at_most_once(events in prop::collection::vec(session_event(), 0..24)) {
        let submissions = run_events(&events);
        prop_assert!(submissions <= 1);

        // The draft survives signed-out events, so any sign-in submits it
        let signs_in = events.iter().any(|event| {
            matches!(event, SessionEvent::Login | SessionEvent::Check { signed_in: true })
        });
        prop_assert_eq!(submissions, usize::from(signs_in));
    }
}

#[test]
fn test_repeated_sign_in_submits_once() {
    let events = [
        SessionEvent::Login,
        SessionEvent::Check { signed_in: true },
        SessionEvent::Resubmit,
        SessionEvent::LoggedOut,
        SessionEvent::Login,
        SessionEvent::Resubmit,
    ];
    assert_eq!(run_events(&events), 1);
}
