//! User-facing SMS copy.

use rand::seq::SliceRandom;

use crate::config::PersonaConfig;

/// Sent after a call ends abruptly.
pub const WELLBEING_MESSAGES: &[&str] = &[
    "Hey, our call dropped. Everything okay?",
    "Looks like we lost connection! No worries, just hit me up if you wanna continue.",
    "It seems our call was disconnected. Please let me know if you'd like to resume at your convenience.",
    "Hey, I noticed our call ended suddenly. Just wanted to check in and make sure you're alright. Let me know if you need anything!",
    "Lost you! You good?",
    "Our call got cut off. Just checking in, are you okay?",
    "You didn't just hang up on me, did you? 😉 Let me know if you wanna finish our chat!",
    "No worries about the dropped call! Just let me know when you're ready to continue.",
    "Technology strikes again! Our call ended unexpectedly. Just wanted to make sure you're okay. Let me know if you need anything!",
    "Guess we got disconnected. No rush, just hit me up when you can!",
    "I think we lost the call. I'll be here if you need to talk again, no pressure at all.",
    "Hey, our call ended. Wanna call me back?",
    "Gotta love technology, right? Our call cut off. Let me know if you want to reconnect!",
    "Hey, I just wanted to check in since our call got off. Hope everything's okay. Just let me know if you need to chat again!",
    "Lost you there! Everything good? No rush, just let me know if you wanna continue.",
    "Hey, just checking in. Our call ended, and I want to make sure everything's alright!",
    "Call dropped. You good?",
];

pub const VOICEMAIL_FOLLOWUP: &str =
    "I just tried to call you but you didn't answer. No worries, just call me when you are ready.";

pub const RESCHEDULE_ASK_TIME: &str =
    "I'd be happy to reschedule our call. What date and time works best for you?";

pub const RESCHEDULE_ACK: &str = "Of course! Give me a moment.";

pub const CALLING_NOW: &str = "I'll call you right now! Please answer your phone.";

pub const CALL_FAILED: &str =
    "I'm sorry, I couldn't initiate a call at this moment. Please call me so we can chat.";

pub const SMS_TROUBLE: &str = "I apologize, but I'm having trouble processing your message right now. Please try again in a few minutes.";

pub const SCHEDULING_NOT_UNDERSTOOD: &str = "Sorry, I'm having trouble understanding your scheduling request. Can you send the date and time you'd like to reschedule to in the next message (E.g. \"Reschedule to March 17th at 10:00 AM\")? Thank you!";

pub const INVITE_SENT: &str = "I just emailed you a calendar invite for our next call.";

/// Pick one wellbeing message at random.
pub fn random_wellbeing_message() -> &'static str {
    WELLBEING_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Hey, our call dropped. Everything okay?")
}

/// Reply to an SMS from a number with no profile.
pub fn sms_signup_prompt(persona: &PersonaConfig) -> String {
    format!(
        "Welcome! To start chatting with me, please sign up first at {}. \
         Once you verify your phone number, you can text me directly!",
        persona.signup_url
    )
}

/// Sent after a call from an unknown number.
pub fn call_signup_link(persona: &PersonaConfig) -> String {
    format!(
        "Thanks for calling! Here's the link to register and talk to {}: {}.",
        persona.coach_name, persona.signup_url
    )
}

/// Confirmation for a call scheduled outside a coaching call.
pub fn scheduled_confirmation(first_name: &str, formatted_date_time: &str) -> String {
    format!(
        "{first_name}, You are now scheduled at {formatted_date_time}. \
         You should've just received a calendar invitation by email."
    )
}

/// Regulatory opt-in notice for US numbers.
pub fn us_signup_notice(persona: &PersonaConfig) -> String {
    format!(
        "You have successfully signed up for {coach} AI Executive Coaching. {coach} will send \
         you coaching SMS messages & book calls with you to help achieve your professional \
         goals. For support and to stop contact please email {email}, you can also reply STOP \
         to cancel communication. Msg frequency varies based on your usage. Msg & data rates \
         may apply.",
        coach = persona.coach_name,
        email = persona.support_email
    )
}

pub fn welcome_greeting(first_name: Option<&str>, persona: &PersonaConfig) -> String {
    let name = first_name.filter(|n| !n.trim().is_empty()).unwrap_or("there");
    format!(
        "Hi {name}, nice to meet you! I'm {}, your AI Executive Coach! \
         I'm here to help you achieve your professional goals.",
        persona.coach_name
    )
}

pub fn welcome_call_notice(save_contact_url: &str) -> String {
    format!(
        "Give me a minute and I'll be calling you. In the meantime, you can save my number \
         to your contacts by clicking this link: {save_contact_url}"
    )
}

pub fn daily_reminder(first_name: &str, time: &str) -> String {
    format!(
        "Good morning {first_name}, just a friendly reminder we have a call today at {time}, \
         looking forward to it!"
    )
}

pub fn ready_for_call(first_name: &str) -> String {
    format!("Hey {first_name}! I'm ready for our call. Just give me a moment and I'll call you.")
}

pub fn missed_call(first_name: &str, time: &str) -> String {
    format!(
        "Hi {first_name}, I noticed you missed our scheduled call at {time}. Would you like to \
         reschedule? Just let me know what time works better for you."
    )
}

/// Nudge for a user who signed up `day` days ago and never called.
pub fn inactivity_nudge(day: i64, first_name: &str) -> Option<String> {
    let text = match day {
        1 => format!(
            "Hi {first_name}! I'm excited to get to know you. I'm available for a call anytime \
             today, just give me a ring when you can."
        ),
        2 => format!(
            "Looking forward to connecting {first_name}! Just a friendly reminder to give me a \
             call when you're ready."
        ),
        3 => format!(
            "Hi {first_name}, do you have 10 minutes today for our discovery call? I'm eager to \
             get to know you and talk about your personal and professional goals."
        ),
        5 => "Just checking in! I'm available for a call anytime today, just give me a ring \
              when you can."
            .to_owned(),
        8 => format!(
            "Hi {first_name}, we haven't been able to connect yet and I want to check in to see \
             if you have any questions or if there's anything holding you back from getting \
             started!"
        ),
        11 => format!(
            "I don't want to be too pushy so this is my last nudge to get started with our \
             discovery call! I know you are very busy {first_name}, so our discovery call is \
             just 10 mins long."
        ),
        _ => return None,
    };
    Some(text)
}
