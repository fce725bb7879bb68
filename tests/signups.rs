mod common;

use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn signups_round_trip_and_reject_duplicates() {
    let app = TestApp::new().await;
    let volunteer = app.volunteer(1).await;
    let opportunity = app.opportunity("Budgeting Workshop Helper", 5).await;

    let (status, signup) = app
        .post(
            "/api/signups",
            json!({ "volunteerId": volunteer, "opportunityId": opportunity, "comments": "Excited!" }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(signup["volunteerId"], volunteer);
    assert_eq!(signup["opportunityId"], opportunity);
    assert_eq!(signup["programId"], serde_json::Value::Null);
    assert_eq!(signup["status"], "pending");
    assert_eq!(signup["comments"], "Excited!");

    let (_, fetched) = app.get(&format!("/api/signups/{}", signup["id"])).await;
    assert_eq!(fetched, signup);
    let (_, listed) = app
        .get(&format!("/api/volunteers/{}/signups", volunteer))
        .await;
    assert_eq!(listed, json!([signup]));
    let (_, filtered) = app
        .get(&format!("/api/signups?opportunityId={}&status=pending", opportunity))
        .await;
    assert_eq!(filtered, json!([signup]));

    let (status, error) = app
        .post("/api/signups", json!({ "volunteerId": volunteer, "opportunityId": opportunity }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "already signed up");

    let (_, opportunity) = app.get(&format!("/api/opportunities/{}", opportunity)).await;
    assert_eq!(opportunity["filledSpots"], 1);
    assert_eq!(app.count("volunteer_signups").await, 1);
}

#[tokio::test]
async fn signups_need_existing_records() {
    let app = TestApp::new().await;
    let volunteer = app.volunteer(1).await;
    let opportunity = app.opportunity("Helper", 5).await;

    let (status, _) = app
        .post("/api/signups", json!({ "volunteerId": 404, "opportunityId": opportunity }))
        .await;
    assert_eq!(status, 400);
    let (status, _) = app
        .post("/api/signups", json!({ "volunteerId": volunteer, "opportunityId": 404 }))
        .await;
    assert_eq!(status, 400);
    let (status, _) = app.post("/api/signups", json!({ "volunteerId": volunteer })).await;
    assert_eq!(status, 400);

    assert_eq!(app.get("/api/volunteers/404/signups").await.0, 404);
    assert_eq!(app.count("volunteer_signups").await, 0);
}

#[tokio::test]
async fn financial_futures_fills_up_at_twenty() {
    let app = TestApp::new().await;
    let program = app.program("Financial Futures").await;
    let opportunity = app
        .create(
            "/api/opportunities",
            json!({ "title": "Financial Futures Coach", "programId": program, "totalSpots": 20 }),
        )
        .await;

    for n in 0..20 {
        let volunteer = app.volunteer(n).await;
        let (status, body) = app
            .post(
                "/api/signups",
                json!({ "volunteerId": volunteer, "opportunityId": opportunity }),
            )
            .await;
        assert_eq!(status, 201, "signup {} failed: {}", n, body);
    }

    let latecomer = app.volunteer(20).await;
    let (status, error) = app
        .post("/api/signups", json!({ "volunteerId": latecomer, "opportunityId": opportunity }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "full");

    let (_, opportunity_json) = app.get(&format!("/api/opportunities/{}", opportunity)).await;
    assert_eq!(opportunity_json["filledSpots"], 20);
    assert_eq!(app.count("volunteer_signups").await, 20);
    let (_, latecomer_signups) = app
        .get(&format!("/api/volunteers/{}/signups", latecomer))
        .await;
    assert_eq!(latecomer_signups, json!([]));

    let (_, available) = app.get("/api/opportunities?available=true").await;
    assert_eq!(available, json!([]));
}

#[tokio::test]
async fn cancelling_gives_the_spot_back() {
    let app = TestApp::new().await;
    let first = app.volunteer(1).await;
    let second = app.volunteer(2).await;
    let opportunity = app.opportunity("Helper", 1).await;
    let opportunity_uri = format!("/api/opportunities/{}", opportunity);

    let (_, signup) = app
        .post("/api/signups", json!({ "volunteerId": first, "opportunityId": opportunity }))
        .await;
    let signup_uri = format!("/api/signups/{}", signup["id"]);

    let (status, cancelled) = app.put(&signup_uri, json!({ "status": "cancelled" })).await;
    assert_eq!(status, 200);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(app.field(&opportunity_uri, "filledSpots").await, 0);

    let (status, _) = app
        .post("/api/signups", json!({ "volunteerId": second, "opportunityId": opportunity }))
        .await;
    assert_eq!(status, 201);
    assert_eq!(app.field(&opportunity_uri, "filledSpots").await, 1);

    let (status, error) = app.put(&signup_uri, json!({ "status": "confirmed" })).await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "full");
    let (_, unchanged) = app.get(&signup_uri).await;
    assert_eq!(unchanged["status"], "cancelled");

    let (status, _) = app.put(&signup_uri, json!({ "status": "maybe" })).await;
    assert_eq!(status, 400);

    assert_eq!(app.delete(&signup_uri).await.0, 204);
    assert_eq!(app.field(&opportunity_uri, "filledSpots").await, 1);
    assert_eq!(app.get(&signup_uri).await.0, 404);
}

#[tokio::test]
async fn hours_worked_roll_up_to_the_volunteer() {
    let app = TestApp::new().await;
    let volunteer = app.volunteer(1).await;
    let morning = app.opportunity("Morning", 5).await;
    let evening = app.opportunity("Evening", 5).await;
    let volunteer_uri = format!("/api/volunteers/{}", volunteer);

    let mut signup_ids = Vec::new();
    for opportunity in [morning, evening] {
        let (_, signup) = app
            .post("/api/signups", json!({ "volunteerId": volunteer, "opportunityId": opportunity }))
            .await;
        signup_ids.push(signup["id"].as_i64().unwrap());
    }

    app.put(
        &format!("/api/signups/{}", signup_ids[0]),
        json!({ "status": "completed", "hoursWorked": 2.5 }),
    )
    .await;
    app.put(
        &format!("/api/signups/{}", signup_ids[1]),
        json!({ "hoursWorked": 4.0 }),
    )
    .await;
    assert_eq!(app.get(&volunteer_uri).await.1["hoursLogged"], 6.5);

    app.put(
        &format!("/api/signups/{}", signup_ids[1]),
        json!({ "hoursWorked": 1.0 }),
    )
    .await;
    assert_eq!(app.get(&volunteer_uri).await.1["hoursLogged"], 3.5);

    let (status, _) = app
        .put(&format!("/api/signups/{}", signup_ids[0]), json!({ "hoursWorked": -1 }))
        .await;
    assert_eq!(status, 400);

    // counters aren't patchable directly
    app.put(&volunteer_uri, json!({ "hoursLogged": 100 })).await;
    assert_eq!(app.get(&volunteer_uri).await.1["hoursLogged"], 3.5);

    assert_eq!(app.delete(&format!("/api/opportunities/{}", evening)).await.0, 204);
    assert_eq!(app.get(&volunteer_uri).await.1["hoursLogged"], 2.5);
    assert_eq!(app.count("volunteer_signups").await, 1);

    assert_eq!(
        app.delete(&format!("/api/signups/{}", signup_ids[0])).await.0,
        204
    );
    assert_eq!(app.get(&volunteer_uri).await.1["hoursLogged"], 0.0);
    let (_, morning_json) = app.get(&format!("/api/opportunities/{}", morning)).await;
    assert_eq!(morning_json["filledSpots"], 0);
}

#[tokio::test]
async fn deleting_a_volunteer_frees_their_spots() {
    let app = TestApp::new().await;
    let leaving = app.volunteer(1).await;
    let staying = app.volunteer(2).await;
    let opportunity = app.opportunity("Helper", 3).await;
    for volunteer in [leaving, staying] {
        app.post("/api/signups", json!({ "volunteerId": volunteer, "opportunityId": opportunity }))
            .await;
    }

    assert_eq!(app.delete(&format!("/api/volunteers/{}", leaving)).await.0, 204);
    assert_eq!(app.get(&format!("/api/volunteers/{}", leaving)).await.0, 404);

    let (_, opportunity_json) = app.get(&format!("/api/opportunities/{}", opportunity)).await;
    assert_eq!(opportunity_json["filledSpots"], 1);
    let (_, remaining) = app.get("/api/signups").await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["volunteerId"], staying);

    let (status, _) = app
        .put(&format!("/api/opportunities/{}", opportunity), json!({ "totalSpots": 0 }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn coaches_sign_up_for_several_programs_at_once() {
    let app = TestApp::new().await;
    let futures = app.program("Financial Futures").await;
    let launch = app.program("Career Launch").await;

    let (status, result) = app
        .post(
            "/api/coach-signups",
            json!({
                "programIds": [futures, launch, futures],
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": "Grace@Example.org",
                "comments": "Weekends only",
            }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(result["volunteer"]["email"], "grace@example.org");
    assert_eq!(result["volunteer"]["interestCoaching"], true);
    assert_eq!(result["volunteer"]["status"], "pending");
    let signups = result["signups"].as_array().unwrap();
    assert_eq!(signups.len(), 2);
    assert_eq!(signups[0]["programId"], futures);
    assert_eq!(signups[1]["programId"], launch);
    assert_eq!(signups[0]["opportunityId"], serde_json::Value::Null);

    let (_, program) = app.get(&format!("/api/programs/{}", futures)).await;
    assert_eq!(program["numberOfCoaches"], 1);

    // the same person again is matched by email, not duplicated
    let (status, error) = app
        .post(
            "/api/coach-signups",
            json!({
                "programIds": [futures],
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": "grace@example.org",
            }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "already signed up");
    assert_eq!(app.count("volunteers").await, 1);
    assert_eq!(app.count("volunteer_signups").await, 2);
}

#[tokio::test]
async fn coach_signups_are_all_or_nothing() {
    let app = TestApp::new().await;
    let open = app.program("Financial Futures").await;
    let full = app
        .create(
            "/api/programs",
            json!({ "name": "Career Launch", "status": "active", "coachSpots": 1 }),
        )
        .await;
    let application = |email: &str, programs: Vec<i64>| {
        json!({
            "programIds": programs,
            "firstName": "Coach",
            "lastName": "Candidate",
            "email": email,
        })
    };

    let (status, _) = app
        .post("/api/coach-signups", application("first@example.org", vec![full]))
        .await;
    assert_eq!(status, 201);

    let (status, error) = app
        .post("/api/coach-signups", application("second@example.org", vec![open, full]))
        .await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "full");
    let (_, open_json) = app.get(&format!("/api/programs/{}", open)).await;
    assert_eq!(open_json["numberOfCoaches"], 0);
    assert_eq!(app.count("volunteers").await, 1);

    let (status, _) = app
        .post("/api/coach-signups", application("third@example.org", vec![open, 404]))
        .await;
    assert_eq!(status, 400);

    let (status, _) = app
        .post("/api/coach-signups", application("fourth@example.org", vec![1, 2, 3, 4, 5]))
        .await;
    assert_eq!(status, 400);
    let (status, _) = app
        .post("/api/coach-signups", application("fifth@example.org", vec![]))
        .await;
    assert_eq!(status, 400);

    assert_eq!(app.count("volunteers").await, 1);
    assert_eq!(app.count("volunteer_signups").await, 1);

    let (status, _) = app.delete(&format!("/api/programs/{}", full)).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn workshop_registrations_respect_capacity() {
    let app = TestApp::new().await;
    let program = app.program("Financial Futures").await;
    let workshop = app
        .create(
            "/api/workshops",
            json!({ "programId": program, "title": "Budgeting 101", "date": "2024-02-01", "maxParticipants": 2 }),
        )
        .await;
    let mut participants = Vec::new();
    for name in ["Sam", "Alex", "Jordan"] {
        participants.push(
            app.create(
                "/api/participants",
                json!({ "programId": program, "firstName": name, "lastName": "Student" }),
            )
            .await,
        );
    }
    let workshop_uri = format!("/api/workshops/{}", workshop);

    for participant in &participants[..2] {
        let (status, registration) = app
            .post(
                "/api/participant-workshops",
                json!({ "participantId": participant, "workshopId": workshop }),
            )
            .await;
        assert_eq!(status, 201);
        assert_eq!(registration["attendanceStatus"], "registered");
    }

    let (status, error) = app
        .post(
            "/api/participant-workshops",
            json!({ "participantId": participants[0], "workshopId": workshop }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "already signed up");

    let (status, error) = app
        .post(
            "/api/participant-workshops",
            json!({ "participantId": participants[2], "workshopId": workshop }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error["message"], "full");
    assert_eq!(app.field(&workshop_uri, "currentParticipants").await, 2);

    let registration_uri = format!("/api/participant-workshops/{}/{}", participants[0], workshop);
    let (status, updated) = app
        .put(&registration_uri, json!({ "attendanceStatus": "attended" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["attendanceStatus"], "attended");
    let (_, attended) = app
        .get("/api/participant-workshops?attendanceStatus=attended")
        .await;
    assert_eq!(attended.as_array().unwrap().len(), 1);

    let (status, _) = app
        .put(&registration_uri, json!({ "attendanceStatus": "asleep" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = app
        .put(&workshop_uri, json!({ "maxParticipants": 1 }))
        .await;
    assert_eq!(status, 400);

    assert_eq!(app.delete(&registration_uri).await.0, 204);
    assert_eq!(app.field(&workshop_uri, "currentParticipants").await, 1);
    assert_eq!(app.delete(&registration_uri).await.0, 404);

    assert_eq!(
        app.delete(&format!("/api/participants/{}", participants[1])).await.0,
        204
    );
    assert_eq!(app.field(&workshop_uri, "currentParticipants").await, 0);
}
