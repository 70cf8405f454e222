//! Reminder content templating.
//!
//! Templates are static, trusted strings keyed by reminder type and
//! language. Placeholders (`{{taskTitle}}`, `{{deadline}}`, `{{priority}}`)
//! are substituted by literal string replacement -- no regex, no escaping.
//! Unknown languages fall back to French, then to the empty template.

use std::collections::HashMap;

use super::{ReminderContent, ReminderPriority, ReminderType};
use crate::task::Task;

/// Title/body template pair for one reminder type in one language.
type Template = (&'static str, &'static str);

const EMPTY_TEMPLATE: Template = ("", "");

fn template_fr(reminder_type: ReminderType) -> Template {
    match reminder_type {
        ReminderType::Deadline => (
            "⏰ Échéance proche",
            "La tâche « {{taskTitle}} » arrive à échéance le {{deadline}}.",
        ),
        ReminderType::Overdue => (
            "🚨 Tâche en retard",
            "« {{taskTitle}} » devait être terminée le {{deadline}}. Priorité : {{priority}}.",
        ),
        ReminderType::Recurring => (
            "🔁 Tâche récurrente",
            "C'est bientôt l'heure de « {{taskTitle}} ».",
        ),
        ReminderType::FollowUp => (
            "👀 Petit rappel",
            "Toujours en cours : « {{taskTitle}} » ?",
        ),
        ReminderType::CheckIn => (
            "🤝 Point d'étape",
            "Où en es-tu sur « {{taskTitle}} » ?",
        ),
        ReminderType::Nudge => (
            "💪 Un coup de pouce",
            "« {{taskTitle}} » n'attend plus que toi.",
        ),
        ReminderType::Celebration => (
            "🎉 Bravo !",
            "« {{taskTitle}} » est terminée. Beau travail !",
        ),
        ReminderType::WeeklySummary => (
            "📊 Résumé de la semaine",
            "Votre récapitulatif hebdomadaire est prêt.",
        ),
    }
}

fn template_en(reminder_type: ReminderType) -> Template {
    match reminder_type {
        ReminderType::Deadline => (
            "⏰ Deadline approaching",
            "\"{{taskTitle}}\" is due on {{deadline}}.",
        ),
        ReminderType::Overdue => (
            "🚨 Task overdue",
            "\"{{taskTitle}}\" was due on {{deadline}}. Priority: {{priority}}.",
        ),
        ReminderType::Recurring => (
            "🔁 Recurring task",
            "\"{{taskTitle}}\" is coming up soon.",
        ),
        ReminderType::FollowUp => (
            "👀 Quick reminder",
            "Still working on \"{{taskTitle}}\"?",
        ),
        ReminderType::CheckIn => (
            "🤝 Checking in",
            "How is \"{{taskTitle}}\" going?",
        ),
        ReminderType::Nudge => (
            "💪 A little nudge",
            "\"{{taskTitle}}\" is waiting for you.",
        ),
        ReminderType::Celebration => (
            "🎉 Well done!",
            "\"{{taskTitle}}\" is complete. Great work!",
        ),
        ReminderType::WeeklySummary => (
            "📊 Weekly summary",
            "Your weekly recap is ready.",
        ),
    }
}

fn lookup(reminder_type: ReminderType, language: &str) -> Option<Template> {
    match language {
        "fr" => Some(template_fr(reminder_type)),
        "en" => Some(template_en(reminder_type)),
        _ => None,
    }
}

fn format_deadline(task: &Task, language: &str) -> String {
    let Some(deadline) = task.deadline else {
        return String::new();
    };
    match language {
        "en" => deadline.format("%m/%d/%Y %I:%M %p").to_string(),
        _ => deadline.format("%d/%m/%Y %H:%M").to_string(),
    }
}

fn substitute(template: &str, task: &Task, deadline: &str, priority: ReminderPriority) -> String {
    template
        .replace("{{taskTitle}}", &task.title)
        .replace("{{deadline}}", deadline)
        .replace("{{priority}}", priority.as_str())
}

/// Render content for a reminder about `task`.
///
/// The action URL is always `/tasks/{task_id}`.
pub fn build_reminder_content(
    task: &Task,
    reminder_type: ReminderType,
    priority: ReminderPriority,
    language: &str,
) -> ReminderContent {
    let (title, body) = lookup(reminder_type, language)
        .or_else(|| lookup(reminder_type, "fr"))
        .unwrap_or(EMPTY_TEMPLATE);
    let deadline = format_deadline(task, language);

    ReminderContent {
        title: substitute(title, task, &deadline, priority),
        body: substitute(body, task, &deadline, priority),
        action_url: Some(format!("/tasks/{}", task.id)),
        metadata: HashMap::new(),
    }
}
