//! Textual commands driving a [`Broker`].
//!
//! Each line maps onto exactly one broker operation:
//!
//! ```text
//! create topic <topicId> <text|number>
//! create partition <topicId> <partitionId>
//! create consumer group <groupId> <topicId> <Range|RoundRobin>
//! create consumer <groupId> <consumerId>
//! create producer <producerId> <text|number> <Random|Manual>
//! delete <consumerId>
//! produce <producerId> <topicId> <eventKey> [<partitionId>]
//! consume <consumerId> <partitionId> [<count>]
//! show topic <topicId>
//! show consumer group <groupId>
//! parallel produce (<producerId> <topicId> <eventKey>)+
//! parallel consume (<consumerId> <partitionId>)+
//! set consumer group rebalancing <groupId> <Range|RoundRobin>
//! playback <consumerId> <partitionId> <offset>
//! ```

use std::fmt::Write;
use std::num::ParseIntError;

use thiserror::Error;

use crate::broker::batch::{ConsumeRequest, ProduceRequest};
use crate::broker::Broker;
use crate::consumer_group::Rebalance;
use crate::error::Result;
use crate::producer::Allocation;
use crate::record::{Event, UnknownValueType, ValueType};

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}'")]
    UnknownVerb(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number '{arg}': {source}")]
    InvalidNumber {
        arg: String,
        #[source]
        source: ParseIntError,
    },

    #[error(transparent)]
    ValueType(#[from] UnknownValueType),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Broker(#[from] crate::error::Error),
}

const USAGE_CREATE_TOPIC: &str = "create topic <topicId> <text|number>";
const USAGE_CREATE_PARTITION: &str = "create partition <topicId> <partitionId>";
const USAGE_CREATE_GROUP: &str = "create consumer group <groupId> <topicId> <Range|RoundRobin>";
const USAGE_CREATE_CONSUMER: &str = "create consumer <groupId> <consumerId>";
const USAGE_CREATE_PRODUCER: &str = "create producer <producerId> <text|number> <Random|Manual>";
const USAGE_DELETE: &str = "delete <consumerId>";
const USAGE_PRODUCE: &str = "produce <producerId> <topicId> <eventKey> [<partitionId>]";
const USAGE_CONSUME: &str = "consume <consumerId> <partitionId> [<count>]";
const USAGE_SHOW: &str = "show topic <topicId> | show consumer group <groupId>";
const USAGE_PARALLEL_PRODUCE: &str = "parallel produce (<producerId> <topicId> <eventKey>)+";
const USAGE_PARALLEL_CONSUME: &str = "parallel consume (<consumerId> <partitionId>)+";
const USAGE_SET: &str = "set consumer group rebalancing <groupId> <Range|RoundRobin>";
const USAGE_PLAYBACK: &str = "playback <consumerId> <partitionId> <offset>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateTopic {
        topic: String,
        value_type: ValueType,
    },
    CreatePartition {
        topic: String,
        partition: String,
    },
    CreateConsumerGroup {
        group: String,
        topic: String,
        strategy: Rebalance,
    },
    CreateConsumer {
        group: String,
        consumer: String,
    },
    CreateProducer {
        producer: String,
        value_type: ValueType,
        allocation: Allocation,
    },
    DeleteConsumer {
        consumer: String,
    },
    Produce {
        producer: String,
        topic: String,
        event_key: String,
        partition: Option<String>,
    },
    Consume {
        consumer: String,
        partition: String,
        count: usize,
    },
    ShowTopic {
        topic: String,
    },
    ShowConsumerGroup {
        group: String,
    },
    ParallelProduce(Vec<ProduceRequest>),
    ParallelConsume(Vec<ConsumeRequest>),
    SetRebalancing {
        group: String,
        strategy: Rebalance,
    },
    Playback {
        consumer: String,
        partition: String,
        offset: u64,
    },
    Quit,
}

fn number<T>(arg: &str) -> Result<T, ParseError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    arg.parse().map_err(|source| ParseError::InvalidNumber {
        arg: arg.to_string(),
        source,
    })
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let args = line.split_whitespace().collect::<Vec<_>>();
        let (verb, rest) = args.split_first().ok_or(ParseError::Empty)?;

        match *verb {
            "create" => Self::parse_create(rest),
            "delete" => match rest {
                [consumer] | ["consumer", consumer] => Ok(Self::DeleteConsumer {
                    consumer: consumer.to_string(),
                }),
                _ => Err(ParseError::Usage(USAGE_DELETE)),
            },
            "produce" => match rest {
                [producer, topic, event_key] => Ok(Self::Produce {
                    producer: producer.to_string(),
                    topic: topic.to_string(),
                    event_key: event_key.to_string(),
                    partition: None,
                }),
                [producer, topic, event_key, partition] => Ok(Self::Produce {
                    producer: producer.to_string(),
                    topic: topic.to_string(),
                    event_key: event_key.to_string(),
                    partition: Some(partition.to_string()),
                }),
                _ => Err(ParseError::Usage(USAGE_PRODUCE)),
            },
            "consume" => match rest {
                [consumer, partition] => Ok(Self::Consume {
                    consumer: consumer.to_string(),
                    partition: partition.to_string(),
                    count: 1,
                }),
                [consumer, partition, count] => Ok(Self::Consume {
                    consumer: consumer.to_string(),
                    partition: partition.to_string(),
                    count: number(count)?,
                }),
                _ => Err(ParseError::Usage(USAGE_CONSUME)),
            },
            "show" => match rest {
                ["topic", topic] => Ok(Self::ShowTopic {
                    topic: topic.to_string(),
                }),
                ["consumer", "group", group] => Ok(Self::ShowConsumerGroup {
                    group: group.to_string(),
                }),
                _ => Err(ParseError::Usage(USAGE_SHOW)),
            },
            "parallel" => Self::parse_parallel(rest),
            "set" => match rest {
                ["consumer", "group", "rebalancing", group, strategy] => Ok(Self::SetRebalancing {
                    group: group.to_string(),
                    strategy: Rebalance::from_name(strategy),
                }),
                _ => Err(ParseError::Usage(USAGE_SET)),
            },
            "playback" => match rest {
                [consumer, partition, offset] => Ok(Self::Playback {
                    consumer: consumer.to_string(),
                    partition: partition.to_string(),
                    offset: number(offset)?,
                }),
                _ => Err(ParseError::Usage(USAGE_PLAYBACK)),
            },
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }

    fn parse_create(rest: &[&str]) -> Result<Self, ParseError> {
        match rest {
            ["topic", topic, value_type] => Ok(Self::CreateTopic {
                topic: topic.to_string(),
                value_type: value_type.parse()?,
            }),
            ["topic", ..] => Err(ParseError::Usage(USAGE_CREATE_TOPIC)),
            ["partition", topic, partition] => Ok(Self::CreatePartition {
                topic: topic.to_string(),
                partition: partition.to_string(),
            }),
            ["partition", ..] => Err(ParseError::Usage(USAGE_CREATE_PARTITION)),
            ["consumer", "group", group, topic, strategy] => Ok(Self::CreateConsumerGroup {
                group: group.to_string(),
                topic: topic.to_string(),
                strategy: Rebalance::from_name(strategy),
            }),
            ["consumer", "group", ..] => Err(ParseError::Usage(USAGE_CREATE_GROUP)),
            ["consumer", group, consumer] => Ok(Self::CreateConsumer {
                group: group.to_string(),
                consumer: consumer.to_string(),
            }),
            ["consumer", ..] => Err(ParseError::Usage(USAGE_CREATE_CONSUMER)),
            ["producer", producer, value_type, allocation] => Ok(Self::CreateProducer {
                producer: producer.to_string(),
                value_type: value_type.parse()?,
                allocation: Allocation::from_name(allocation),
            }),
            ["producer", ..] => Err(ParseError::Usage(USAGE_CREATE_PRODUCER)),
            [other, ..] => Err(ParseError::UnknownVerb(format!("create {other}"))),
            [] => Err(ParseError::Usage(USAGE_CREATE_TOPIC)),
        }
    }

    fn parse_parallel(rest: &[&str]) -> Result<Self, ParseError> {
        match rest {
            ["produce", triples @ ..] if !triples.is_empty() && triples.len() % 3 == 0 => {
                Ok(Self::ParallelProduce(
                    triples
                        .chunks_exact(3)
                        .map(|c| ProduceRequest::new(c[0], c[1], c[2]))
                        .collect(),
                ))
            }
            ["produce", ..] => Err(ParseError::Usage(USAGE_PARALLEL_PRODUCE)),
            ["consume", pairs @ ..] if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                Ok(Self::ParallelConsume(
                    pairs
                        .chunks_exact(2)
                        .map(|c| ConsumeRequest::new(c[0], c[1]))
                        .collect(),
                ))
            }
            ["consume", ..] => Err(ParseError::Usage(USAGE_PARALLEL_CONSUME)),
            _ => Err(ParseError::Usage(USAGE_PARALLEL_PRODUCE)),
        }
    }

    /// Runs the command and renders what happened.
    pub async fn execute(&self, broker: &Broker) -> Result<String> {
        let mut out = String::new();
        match self {
            Self::CreateTopic { topic, value_type } => {
                broker.create_topic(topic, *value_type)?;
                let _ = writeln!(out, "Created topic '{topic}' ({value_type})");
            }
            Self::CreatePartition { topic, partition } => {
                broker.create_partition(topic, partition)?;
                let _ = writeln!(out, "Created partition '{partition}' in topic '{topic}'");
            }
            Self::CreateConsumerGroup {
                group,
                topic,
                strategy,
            } => {
                broker.create_consumer_group(group, topic, *strategy)?;
                let _ = writeln!(
                    out,
                    "Created consumer group '{group}' on topic '{topic}' ({strategy})"
                );
            }
            Self::CreateConsumer { group, consumer } => {
                broker.create_consumer(group, consumer)?;
                let _ = writeln!(out, "Created consumer '{consumer}' in group '{group}'");
                let _ = write!(out, "{}", broker.show_consumer_group(group)?);
            }
            Self::CreateProducer {
                producer,
                value_type,
                allocation,
            } => {
                broker.create_producer(producer, *value_type, *allocation)?;
                let _ = writeln!(
                    out,
                    "Created producer '{producer}' ({value_type}, {allocation})"
                );
            }
            Self::DeleteConsumer { consumer } => {
                let group = broker.delete_consumer(consumer)?;
                let _ = writeln!(out, "Deleted consumer '{consumer}'");
                let _ = write!(out, "{group}");
            }
            Self::Produce {
                producer,
                topic,
                event_key,
                partition,
            } => {
                let produced = broker.produce(producer, topic, event_key, partition.as_deref())?;
                let _ = writeln!(
                    out,
                    "Produced '{event_key}' to partition '{}' at offset {}",
                    produced.partition, produced.offset
                );
            }
            Self::Consume {
                consumer,
                partition,
                count,
            } => {
                let events = broker.consume(consumer, partition, *count)?;
                for event in &events {
                    render_consumed(&mut out, consumer, event);
                }
                let total = broker.consumer(consumer)?.consumed_count();
                let _ = writeln!(out, "Consumer '{consumer}' has consumed {total} event(s)");
            }
            Self::ShowTopic { topic } => {
                let _ = write!(out, "{}", broker.show_topic(topic)?);
            }
            Self::ShowConsumerGroup { group } => {
                let _ = write!(out, "{}", broker.show_consumer_group(group)?);
            }
            Self::ParallelProduce(requests) => {
                let report = broker.parallel_produce(requests.clone()).await;
                for (request, outcome) in requests.iter().zip(&report.outcomes) {
                    match outcome {
                        Ok(produced) => {
                            let _ = writeln!(
                                out,
                                "Produced '{}' to partition '{}' at offset {}",
                                request.event_key, produced.partition, produced.offset
                            );
                        }
                        Err(e) => {
                            let _ = writeln!(out, "Failed to produce '{}': {e}", request.event_key);
                        }
                    }
                }
            }
            Self::ParallelConsume(requests) => {
                let report = broker.parallel_consume(requests.clone()).await;
                for (request, outcome) in requests.iter().zip(&report.outcomes) {
                    match outcome {
                        Ok(event) => render_consumed(&mut out, &request.consumer, event),
                        Err(e) => {
                            let _ = writeln!(
                                out,
                                "Consumer '{}' failed on partition '{}': {e}",
                                request.consumer, request.partition
                            );
                        }
                    }
                }
            }
            Self::SetRebalancing { group, strategy } => {
                broker.set_consumer_group_rebalancing(group, *strategy)?;
                let _ = writeln!(out, "Consumer group '{group}' now rebalances with {strategy}");
            }
            Self::Playback {
                consumer,
                partition,
                offset,
            } => {
                broker.playback(consumer, partition, *offset)?;
                let _ = writeln!(out, "Playback is not supported, nothing replayed");
            }
            Self::Quit => {}
        }

        Ok(out)
    }
}

fn render_consumed(out: &mut String, consumer: &str, event: &Event) {
    let _ = writeln!(
        out,
        "Consumer '{consumer}' consumed '{}' = {} ({}, from {})",
        event.id(),
        event.value(),
        event.payload_type(),
        event.source()
    );
}

/// Parses and executes one line.
pub async fn run_line(broker: &Broker, line: &str) -> Result<String, CommandError> {
    let command = Command::parse(line)?;
    Ok(command.execute(broker).await?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_create() {
        assert_eq!(
            Command::parse("create topic t1 number").unwrap(),
            Command::CreateTopic {
                topic: "t1".to_string(),
                value_type: ValueType::Number
            }
        );
        assert_eq!(
            Command::parse("create partition t1 p0").unwrap(),
            Command::CreatePartition {
                topic: "t1".to_string(),
                partition: "p0".to_string()
            }
        );
        assert_eq!(
            Command::parse("create consumer group g1 t1 RoundRobin").unwrap(),
            Command::CreateConsumerGroup {
                group: "g1".to_string(),
                topic: "t1".to_string(),
                strategy: Rebalance::RoundRobin
            }
        );
        assert_eq!(
            Command::parse("create consumer g1 c1").unwrap(),
            Command::CreateConsumer {
                group: "g1".to_string(),
                consumer: "c1".to_string()
            }
        );
        assert_eq!(
            Command::parse("create producer p1 String Manual").unwrap(),
            Command::CreateProducer {
                producer: "p1".to_string(),
                value_type: ValueType::Text,
                allocation: Allocation::Manual
            }
        );
    }

    #[test]
    fn parse_optional_arguments() {
        assert_matches!(
            Command::parse("produce p1 t1 e1").unwrap(),
            Command::Produce { partition: None, .. }
        );
        assert_matches!(
            Command::parse("produce p1 t1 e1 p0").unwrap(),
            Command::Produce { partition: Some(p), .. } if p == "p0"
        );
        assert_matches!(
            Command::parse("consume c1 p0").unwrap(),
            Command::Consume { count: 1, .. }
        );
        assert_matches!(
            Command::parse("consume c1 p0 3").unwrap(),
            Command::Consume { count: 3, .. }
        );
    }

    #[test]
    fn parse_parallel() {
        assert_eq!(
            Command::parse("parallel produce p1 t1 e1 p2 t1 e2").unwrap(),
            Command::ParallelProduce(vec![
                ProduceRequest::new("p1", "t1", "e1"),
                ProduceRequest::new("p2", "t1", "e2"),
            ])
        );
        assert_eq!(
            Command::parse("parallel consume c1 p0 c2 p1").unwrap(),
            Command::ParallelConsume(vec![
                ConsumeRequest::new("c1", "p0"),
                ConsumeRequest::new("c2", "p1"),
            ])
        );
        assert_eq!(
            Command::parse("parallel produce p1 t1"),
            Err(ParseError::Usage(USAGE_PARALLEL_PRODUCE))
        );
        assert_eq!(
            Command::parse("parallel consume c1"),
            Err(ParseError::Usage(USAGE_PARALLEL_CONSUME))
        );
    }

    #[test]
    fn parse_misc() {
        assert_eq!(
            Command::parse("delete c1").unwrap(),
            Command::DeleteConsumer {
                consumer: "c1".to_string()
            }
        );
        assert_eq!(
            Command::parse("delete consumer c1").unwrap(),
            Command::DeleteConsumer {
                consumer: "c1".to_string()
            }
        );
        assert_eq!(
            Command::parse("show consumer group g1").unwrap(),
            Command::ShowConsumerGroup {
                group: "g1".to_string()
            }
        );
        assert_eq!(
            Command::parse("set consumer group rebalancing g1 RoundRobin").unwrap(),
            Command::SetRebalancing {
                group: "g1".to_string(),
                strategy: Rebalance::RoundRobin
            }
        );
        assert_eq!(Command::parse("q").unwrap(), Command::Quit);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert_eq!(
            Command::parse("publish x"),
            Err(ParseError::UnknownVerb("publish".to_string()))
        );
        assert_eq!(
            Command::parse("create topic t1"),
            Err(ParseError::Usage(USAGE_CREATE_TOPIC))
        );
        assert_matches!(
            Command::parse("create topic t1 float"),
            Err(ParseError::ValueType(_))
        );
        assert_matches!(
            Command::parse("consume c1 p0 many"),
            Err(ParseError::InvalidNumber { .. })
        );
        assert_eq!(
            Command::parse("show partition p0"),
            Err(ParseError::Usage(USAGE_SHOW))
        );
    }

    #[test]
    fn unknown_strategy_names_fall_back() {
        assert_matches!(
            Command::parse("create consumer group g1 t1 Sticky").unwrap(),
            Command::CreateConsumerGroup {
                strategy: Rebalance::Range,
                ..
            }
        );
        assert_matches!(
            Command::parse("create producer p1 text Hashed").unwrap(),
            Command::CreateProducer {
                allocation: Allocation::Random,
                ..
            }
        );
    }
}
