/// Execute an aggregate command in memory: decide, then apply each event.
///
/// No persistence and no publication. Handy in tests and when a workflow needs
/// to preview what a command would do before dispatching it for real.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: tokoledger_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
