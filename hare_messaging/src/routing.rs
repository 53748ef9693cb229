use hare_core::{binding::Binding, exchange::ExchangeType, queue::QueueName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSegment {
    Word(String),
    /// `*`, exactly one word
    SingleWildcard,
    /// `#`, zero or more words
    MultiWildcard,
}

pub fn parse_topic(topic: &str) -> Vec<TopicSegment> {
    topic
        .split('.')
        .map(|segment| match segment {
            "*" => TopicSegment::SingleWildcard,
            "#" => TopicSegment::MultiWildcard,
            word => TopicSegment::Word(word.to_owned()),
        })
        .collect()
}

/// Route a message through an exchange. Returns every bound queue whose binding matches, in
/// the order of `bindings`.
pub fn route<'a>(
    kind: ExchangeType,
    routing_key: &str,
    bindings: impl IntoIterator<Item = &'a Binding>,
) -> Vec<QueueName> {
    let bindings = bindings.into_iter();

    match kind {
        // 3.1.3.1 - routing-key = routing-key
        ExchangeType::Direct => bindings
            .filter(|binding| binding.binding_key == routing_key)
            .map(|binding| binding.queue.clone())
            .collect(),
        // 3.1.3.2 - unconditionally
        ExchangeType::Fanout => bindings.map(|binding| binding.queue.clone()).collect(),
        ExchangeType::Topic => {
            // todo: parse the patterns once when binding instead of on every publish
            let patterns = bindings
                .map(|binding| (parse_topic(&binding.binding_key), binding.queue.clone()))
                .collect::<Vec<_>>();
            match_topic(&patterns, routing_key)
        }
    }
}

fn match_topic<Q: Clone>(patterns: &[(Vec<TopicSegment>, Q)], routing_key: &str) -> Vec<Q> {
    let key = routing_key.split('.').collect::<Vec<_>>();

    patterns
        .iter()
        .filter(|(pattern, _)| matches_topic(pattern, &key))
        .map(|(_, value)| value.clone())
        .collect()
}

fn matches_topic(pattern: &[TopicSegment], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((TopicSegment::Word(word), rest)) => match key.split_first() {
            Some((first, key_rest)) => *first == word.as_str() && matches_topic(rest, key_rest),
            None => false,
        },
        Some((TopicSegment::SingleWildcard, rest)) => {
            !key.is_empty() && matches_topic(rest, &key[1..])
        }
        // try every possible length for the run of words consumed by the `#`
        Some((TopicSegment::MultiWildcard, rest)) => {
            (0..=key.len()).any(|skip| matches_topic(rest, &key[skip..]))
        }
    }
}
