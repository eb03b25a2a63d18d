use crate::infra::{InMemoryStores, Services, DEMO_POSTING, DEMO_RECRUITER};
use crate::server::seed_failure;
use chrono::Utc;
use clap::Args;
use hirewire::config::AppConfig;
use hirewire::error::AppError;
use hirewire::workflows::recruitment::interview::{
    ClientEvent, IssuedSession, MeetRequest, RoomPhase, SessionError, TokenPayload,
};
use hirewire::workflows::recruitment::pipeline::{
    BulkCandidateAction, CandidateAction, PipelineError, PipelineState, QualificationOutcome,
};
use hirewire::workflows::recruitment::{Actor, CandidateId, PostingId};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Stop after the pipeline walkthrough, before minting interview sessions.
    #[arg(long)]
    pub(crate) skip_interview: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let stores = InMemoryStores::seeded().map_err(seed_failure)?;
    let services = Services::build(&config, stores.ports());
    let recruiter = Actor::new(DEMO_RECRUITER);
    let posting = PostingId::new(DEMO_POSTING);

    println!("Hiring pipeline demo ({DEMO_POSTING})");

    let outcome = services.pipeline.qualify(
        &recruiter,
        CandidateAction {
            candidate_id: CandidateId::new("cand-ada"),
            posting_id: posting.clone(),
        },
    )?;
    render_outcome("qualify cand-ada", &outcome);

    let outcome = services.pipeline.bulk_qualify(
        &recruiter,
        BulkCandidateAction {
            candidate_ids: ids(&["cand-alan", "cand-grace", "cand-alan"]),
            posting_id: posting.clone(),
        },
    )?;
    render_outcome("bulk qualify (duplicate ids collapse)", &outcome);

    let advanced = services.pipeline.advance_workflow(&recruiter, &posting)?;
    println!(
        "- advance workflow -> {}",
        advanced
            .active_step
            .as_ref()
            .map(|step| step.step_type.label())
            .unwrap_or("finished")
    );

    match services.pipeline.qualify(
        &recruiter,
        CandidateAction {
            candidate_id: CandidateId::new("cand-ada"),
            posting_id: posting.clone(),
        },
    ) {
        Err(PipelineError::InvalidState(PipelineState::NotResumeScreening)) => {
            println!("- qualify outside resume screening is refused")
        }
        other => println!("- unexpected qualify result: {other:?}"),
    }

    let outcome = services.pipeline.bulk_disqualify(
        &recruiter,
        BulkCandidateAction {
            candidate_ids: ids(&["cand-alan"]),
            posting_id: posting.clone(),
        },
    )?;
    render_outcome("bulk disqualify cand-alan", &outcome);

    let advanced = services.pipeline.advance_workflow(&recruiter, &posting)?;
    let code = advanced.interview_code.clone().unwrap_or_default();
    println!(
        "- advance workflow -> {} (room {code})",
        advanced
            .active_step
            .as_ref()
            .map(|step| step.step_type.label())
            .unwrap_or("finished")
    );

    let resume = services
        .pipeline
        .resume_url(&recruiter, &CandidateId::new("cand-grace"))?;
    println!("- resume for cand-grace: {resume}");

    if args.skip_interview {
        return Ok(());
    }

    println!("\nInterview sessions");
    let request = || MeetRequest {
        posting_id: posting.clone(),
    };
    let interviewer = services.interview.issuer.issue(&recruiter, request())?;
    render_session("recruiter", &interviewer);
    let candidate = services
        .interview
        .issuer
        .issue(&Actor::new("user-cand-grace"), request())?;
    render_session("cand-grace", &candidate);
    match services
        .interview
        .issuer
        .issue(&Actor::new("user-cand-alan"), request())
    {
        Err(SessionError::Unauthorized) => println!("- cand-alan (rejected): unauthorized"),
        other => println!("- unexpected session for cand-alan: {other:?}"),
    }

    let rendezvous = &services.interview.rendezvous;
    let (interviewer_conn, _interviewer_inbox) = rendezvous.connect();
    let (candidate_conn, _candidate_inbox) = rendezvous.connect();
    let joined = |token: &str| {
        ClientEvent::UserJoined(TokenPayload {
            token: token.to_string(),
        })
    };
    let mut phases = vec![phase_label(rendezvous.phase(&code))];
    if rendezvous.handle(candidate_conn, joined(&candidate.token)).is_ok() {
        phases.push(phase_label(rendezvous.phase(&code)));
    }
    if rendezvous
        .handle(interviewer_conn, joined(&interviewer.token))
        .is_ok()
    {
        phases.push(phase_label(rendezvous.phase(&code)));
    }
    let answered = ClientEvent::UserAnsweredCall(TokenPayload {
        token: candidate.token.clone(),
    });
    if rendezvous.handle(candidate_conn, answered).is_ok() {
        phases.push(phase_label(rendezvous.phase(&code)));
    }
    println!("- room {code}: {}", phases.join(" -> "));
    rendezvous.disconnect(candidate_conn);
    rendezvous.disconnect(interviewer_conn);

    println!("\nVideo grants");
    for session in [&interviewer, &candidate] {
        let verified = services
            .interview
            .signer
            .verify_session(&session.token, Utc::now())
            .map_err(|_| SessionError::Unauthorized)?;
        match services.interview.bridge.grant(&verified) {
            Ok(grant) => println!(
                "- {} as {} on {}",
                grant.name,
                grant.role.label(),
                grant.call_id
            ),
            Err(err) => println!("- grant failed for {}: {err}", verified.claims().name),
        }
    }

    Ok(())
}

fn ids(values: &[&str]) -> Vec<CandidateId> {
    values.iter().map(|value| CandidateId::new(*value)).collect()
}

fn render_outcome(label: &str, outcome: &QualificationOutcome) {
    let candidates: Vec<&str> = outcome.candidates.iter().map(|id| id.as_str()).collect();
    println!(
        "- {label}: changed {} -> [{}]",
        outcome.changed,
        candidates.join(", ")
    );
}

fn render_session(label: &str, session: &IssuedSession) {
    let role = if session.claims.is_interviewer {
        "interviewer"
    } else {
        "candidate"
    };
    println!(
        "- {label}: {role} session for room {} as {}",
        session.claims.code, session.claims.name
    );
}

fn phase_label(phase: RoomPhase) -> &'static str {
    match phase {
        RoomPhase::Empty => "empty",
        RoomPhase::AwaitingInterviewer => "awaiting-interviewer",
        RoomPhase::Paired => "paired",
        RoomPhase::InCall => "in-call",
    }
}
