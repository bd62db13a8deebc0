//! Prompt text for outreach composition.

/// Who the messages come from.
#[derive(Debug, Clone)]
pub struct Sender {
    pub name: String,
    pub company: String,
}

/// Shared system preamble for every outreach message.
pub fn system_prompt(sender: &Sender) -> String {
    format!(
        "\
You draft cold outreach on behalf of {name} at {company}. {company} helps investment firms and \
their portfolio companies put AI and data capabilities into production.

Write as a knowledgeable peer, not a vendor:
- Be direct. No pleasantries such as \"I hope this finds you well\".
- Be specific to the person: their background, their firm, their situation.
- Keep emails under 150 words and LinkedIn notes under 300 characters.
- End with a single low-friction ask, usually a short call.

Never mention pricing, other clients by name, or generic AI hype. Never leave placeholder \
brackets in the text.",
        name = sender.name,
        company = sender.company,
    )
}

const EMAIL_FORMAT: &str = "\
Return ONLY:
SUBJECT: <subject line>
BODY:
<email body>";

/// Prompt for email `step` of the cadence. `previous` is the preceding step's
/// subject and body, used from step 2 on.
pub fn email_prompt(step: u32, dossier: &str, previous: Option<&str>, sender: &Sender) -> String {
    let name = &sender.name;
    match step {
        1 => format!(
            "\
Write a first-touch cold email to this prospect.

PROSPECT DOSSIER:
{dossier}

REQUIREMENTS:
- Short, specific subject line that references their role or firm
- Open with something concrete about them (career move, education, current role)
- Connect their situation to a problem {company} solves
- Suggest a brief call without pressure
- Sign off as {name}
- Body under 150 words

{EMAIL_FORMAT}",
            company = sender.company,
        ),
        2 => format!(
            "\
Write follow-up #{step} to a prospect who has not replied yet.

PROSPECT DOSSIER:
{dossier}

PREVIOUS EMAIL:
{previous}

REQUIREMENTS:
- Build on the previous email naturally; do not say you are following up
- Add one new insight or angle relevant to them
- Shorter than the previous email (under 100 words)
- Same low-pressure ask
- Sign off as {name}

{EMAIL_FORMAT}",
            previous = previous.unwrap_or("(not available)"),
        ),
        3 => format!(
            "\
Write follow-up #{step} built around a short anonymised case study.

PROSPECT DOSSIER:
{dossier}

PREVIOUS EMAIL:
{previous}

REQUIREMENTS:
- Describe a relevant engagement without naming the client
- Match it to the challenges their profile suggests
- Under 120 words
- Offer to share details on a quick call
- Sign off as {name}

{EMAIL_FORMAT}",
            previous = previous.unwrap_or("(not available)"),
        ),
        _ => format!(
            "\
Write the final email (step {step}) of the sequence.

PROSPECT DOSSIER:
{dossier}

REQUIREMENTS:
- Acknowledge they are busy, without guilt
- Leave the door open
- Under 60 words
- Sign off as {name}

{EMAIL_FORMAT}"
        ),
    }
}

pub fn linkedin_connection_prompt(dossier: &str) -> String {
    format!(
        "\
Write a LinkedIn connection request note for this prospect.

PROSPECT DOSSIER:
{dossier}

REQUIREMENTS:
- At most 280 characters
- Reference something specific (shared background, their role, their firm)
- No selling

Return ONLY the message text."
    )
}

pub fn linkedin_message_prompt(dossier: &str, sender: &Sender) -> String {
    format!(
        "\
Write a LinkedIn message to a prospect who just accepted a connection request.

PROSPECT DOSSIER:
{dossier}

REQUIREMENTS:
- Thank them briefly for connecting
- Reference something specific about their background
- Explain in one line why {company} may be relevant
- Under 300 characters, one soft ask

Return ONLY the message text.",
        company = sender.company,
    )
}
