// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Unwinding an abandoned fiber: pops exactly what its begin phase pushed,
//! without touching the host.

use crate::element::ElementType;
use crate::fiber::{FiberId, WorkTag};
use crate::host::HostConfig;
use crate::reconciler::Reconciler;
use crate::trace::{Tracer, UnitEvent};

impl<H: HostConfig> Reconciler<H> {
    pub(crate) fn unwind_work(&mut self, fiber: FiberId, tracer: &mut Tracer<'_>) {
        let tag = self.arena[fiber].tag;
        tracing::trace!(%fiber, ?tag, "unwind");
        tracer.unwind(&UnitEvent { fiber, tag });

        let session = &mut self.session;
        match tag {
            WorkTag::HostRoot => session
                .host_context
                .pop_host_container(&mut session.stack, fiber),
            WorkTag::HostComponent => session
                .host_context
                .pop_host_context(&mut session.stack, fiber),
            WorkTag::ContextProvider => {
                let Some(ElementType::Provider(ctx)) = self.arena[fiber].ty else {
                    let error = self.missing_type(fiber);
                    tracing::error!(%error, "provider value left on the stack");
                    return;
                };
                if let Err(error) =
                    session
                        .context
                        .pop_provider(&mut session.stack, &mut self.contexts, fiber, ctx)
                {
                    tracing::error!(%error, "provider value not restored");
                }
            }
            WorkTag::IndeterminateComponent
            | WorkTag::FunctionComponent
            | WorkTag::MemoComponent
            | WorkTag::HostText
            | WorkTag::Fragment
            | WorkTag::ContextConsumer => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::element::Element;
    use crate::expiration::ExpirationTime;
    use crate::testing::{CONTAINER, TestHost};

    #[test]
    fn provider_without_a_type_pops_nothing() {
        let mut r = Reconciler::new(TestHost::new(), CONTAINER);
        let ctx = r.create_context(0_u8);
        let provider = r
            .arena
            .create_from_element(&ctx.provider(1, vec![Element::text("x")]), ExpirationTime::SYNC);
        assert_eq!(r.arena[provider].tag, WorkTag::ContextProvider);
        r.arena[provider].ty = None;

        r.unwind_work(provider, &mut Tracer::none());
        assert!(r.session.is_torn_down());
        assert_eq!(*ctx.downcast(r.contexts.current(ctx.id()).unwrap().clone()), 0);
    }
}
