use serenity::all::Message;

/// Message content plus any embed text, one part per line.
pub fn extract_message_text(message: &Message) -> String {
    let mut parts = Vec::new();

    let content = message.content.trim();
    if !content.is_empty() {
        parts.push(content.to_string());
    }

    for embed in &message.embeds {
        for text in [&embed.title, &embed.description].into_iter().flatten() {
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
    }

    parts.join("\n")
}

/// Replaces `<@id>` and `<@!id>` tokens with `@name` for the given users.
pub fn resolve_user_mentions<'a>(
    input: &str,
    users: impl IntoIterator<Item = (u64, &'a str)>,
) -> String {
    let mut output = input.to_string();
    for (id, name) in users {
        let readable = format!("@{}", name);
        output = output
            .replace(&format!("<@{}>", id), &readable)
            .replace(&format!("<@!{}>", id), &readable);
    }
    output
}

/// Human readable text of a message, the way it shows up in the client.
pub fn clean_content(message: &Message) -> String {
    let text = extract_message_text(message);
    resolve_user_mentions(
        &text,
        message
            .mentions
            .iter()
            .map(|user| (user.id.get(), user.name.as_str())),
    )
    .trim()
    .to_string()
}

/// Cuts `input` to at most `limit` characters without splitting a code point.
pub fn truncate_for_discord(input: &str, limit: usize) -> String {
    match input.char_indices().nth(limit) {
        Some((byte_index, _)) => input[..byte_index].to_string(),
        None => input.to_string(),
    }
}
