use serde::{Deserialize, Serialize};

use crate::registrations::repo_types::{Participant, Registration};

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub attended: bool,
}

#[derive(Debug, Serialize)]
pub struct RegistrationList {
    pub registrations: Vec<Registration>,
}

#[derive(Debug, Serialize)]
pub struct ParticipantList {
    pub participants: Vec<Participant>,
}
