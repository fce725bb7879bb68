mod common;

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use common::TestApp;

/// Sends every request at once and waits for all of them.
async fn all_at_once(app: &TestApp, uri: &str, bodies: Vec<Value>) -> Vec<(u16, Value)> {
    let handles: Vec<JoinHandle<(u16, Value)>> = bodies
        .into_iter()
        .map(|body| {
            let app = app.clone();
            let uri = uri.to_owned();
            tokio::spawn(async move { app.post(&uri, body).await })
        })
        .collect();

    let mut responses = Vec::with_capacity(handles.len());
    for handle in handles {
        responses.push(handle.await.unwrap());
    }

    responses
}

fn count_status(responses: &[(u16, Value)], status: u16) -> usize {
    responses.iter().filter(|(s, _)| *s == status).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_signups_never_overbook() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::on_disk(dir.path()).await;
    let opportunity = app.opportunity("Financial Futures Coach", 20).await;
    let mut volunteers = Vec::new();
    for n in 0..25 {
        volunteers.push(app.volunteer(n).await);
    }

    let bodies = volunteers
        .iter()
        .map(|volunteer| json!({ "volunteerId": volunteer, "opportunityId": opportunity }))
        .collect();
    let responses = all_at_once(&app, "/api/signups", bodies).await;

    assert_eq!(count_status(&responses, 201), 20, "{:?}", responses);
    assert_eq!(count_status(&responses, 409), 5, "{:?}", responses);
    for (status, body) in &responses {
        if *status == 409 {
            assert_eq!(body["message"], "full");
        }
    }
    let opportunity_uri = format!("/api/opportunities/{}", opportunity);
    assert_eq!(app.field(&opportunity_uri, "filledSpots").await, 20);
    assert_eq!(app.count("volunteer_signups").await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_repeats_sign_up_once() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::on_disk(dir.path()).await;
    let opportunity = app.opportunity("Budgeting Workshop Helper", 5).await;
    let volunteer = app.volunteer(1).await;

    let body = json!({ "volunteerId": volunteer, "opportunityId": opportunity });
    let responses = all_at_once(&app, "/api/signups", vec![body; 10]).await;

    assert_eq!(count_status(&responses, 201), 1, "{:?}", responses);
    assert_eq!(count_status(&responses, 409), 9, "{:?}", responses);
    for (status, body) in &responses {
        if *status == 409 {
            assert_eq!(body["message"], "already signed up");
        }
    }
    let opportunity_uri = format!("/api/opportunities/{}", opportunity);
    assert_eq!(app.field(&opportunity_uri, "filledSpots").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_coach_applications_respect_coach_spots() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::on_disk(dir.path()).await;
    let program = app
        .create(
            "/api/programs",
            json!({ "name": "Financial Futures", "status": "active", "coachSpots": 3 }),
        )
        .await;

    let bodies = (0..8)
        .map(|n| {
            json!({
                "programIds": [program],
                "firstName": "Coach",
                "lastName": format!("Number{}", n),
                "email": format!("coach{}@example.org", n),
            })
        })
        .collect();
    let responses = all_at_once(&app, "/api/coach-signups", bodies).await;

    assert_eq!(count_status(&responses, 201), 3, "{:?}", responses);
    assert_eq!(count_status(&responses, 409), 5, "{:?}", responses);
    let program_uri = format!("/api/programs/{}", program);
    assert_eq!(app.field(&program_uri, "numberOfCoaches").await, 3);
    // rejected applications leave no volunteer behind
    assert_eq!(app.count("volunteers").await, 3);
}
