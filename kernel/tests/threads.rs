//! Thread creation, join, and the wakeup channel over the mock platform.

use kernel::config::{KTHREAD_STACK_SIZE, NTHREAD};
use kernel::process::table;
use kernel::task::sleep::{wakeup, Channel};
use kernel::task::{
    kthread_create, kthread_id, kthread_join, ThreadError, ThreadState, Tid,
};
use kernel::test_support as ts;

#[test]
fn kthread_create_clones_the_caller_and_retargets_it() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("threads");

        {
            let frames = p.data_mut().trap_frames.as_mut().unwrap();
            let frame = frames.frame_mut(0);
            frame.epc = 0x1000;
            frame.sp = 0x8000;
            frame.s5 = 0x77;
        }

        let tid = ts::with_current(p, 0, || kthread_create(0x6000, 0x2000).unwrap());

        // The new thread landed in slot 1 with a runnable state.
        let t1 = &p.threads[1];
        let tg = t1.inner.lock();
        assert_eq!(tg.state, ThreadState::Runnable);
        assert_eq!(tg.tid, tid);
        assert_eq!(tg.trap_index, 1);
        drop(tg);
        assert!(t1.data().kstack.is_some());
        assert!(t1.data().trap_backup.is_some());

        // Its frame is the caller's, retargeted at the new entry/stack.
        let frames = p.data().trap_frames.as_ref().unwrap();
        let frame = frames.frame(1);
        assert_eq!(frame.s5, 0x77);
        assert_eq!(frame.epc, 0x6000);
        assert_eq!(frame.sp, 0x2000 + KTHREAD_STACK_SIZE - 16);
    });
}

#[test]
fn thread_slots_are_bounded_per_process() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("crowded");
        ts::with_current(p, 0, || {
            // Slot 0 is the caller; one allocation per remaining slot.
            for _ in 1..NTHREAD {
                kthread_create(0x6000, 0x2000).unwrap();
            }
            assert_eq!(
                kthread_create(0x6000, 0x2000),
                Err(ThreadError::OutOfThreads)
            );
        });
    });
}

#[test]
fn failed_thread_creation_unwinds_the_slot() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("oom");
        ts::with_current(p, 0, || {
            ts::set_alloc_budget(0);
            assert_eq!(
                kthread_create(0x6000, 0x2000),
                Err(ThreadError::OutOfMemory)
            );
            ts::clear_alloc_budget();
        });
        let tg = p.threads[1].inner.lock();
        assert_eq!(tg.state, ThreadState::Unused);
        assert_eq!(tg.tid, Tid::NONE);
        drop(tg);
        assert!(p.threads[1].data().kstack.is_none());
        assert!(p.threads[1].data().trap_backup.is_none());
    });
}

#[test]
fn tids_are_unique_and_kthread_id_reports_the_caller() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("ids");
        let my_tid = p.threads[0].inner.lock().tid;
        ts::with_current(p, 0, || {
            assert_eq!(kthread_id(), Ok(my_tid));
            let a = kthread_create(0x6000, 0x2000).unwrap();
            let b = kthread_create(0x6000, 0x3000).unwrap();
            assert!(b > a);
            assert!(a > my_tid);
        });
        assert_eq!(kthread_id(), Err(ThreadError::NoCurrentThread));
    });
}

#[test]
fn join_reaps_a_zombie_thread_without_blocking() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("joiner");
        let tid = ts::with_current(p, 0, || kthread_create(0x6000, 0x2000).unwrap());

        // The thread "exits" with status 5.
        {
            let mut tg = p.threads[1].inner.lock();
            tg.state = ThreadState::Zombie;
            tg.xstate = 5;
        }

        let status = ts::with_current(p, 0, || kthread_join(tid));
        assert_eq!(status, Ok(5));

        // Slot recycled.
        let tg = p.threads[1].inner.lock();
        assert_eq!(tg.state, ThreadState::Unused);
        assert_eq!(tg.tid, Tid::NONE);
    });
}

#[test]
fn join_of_an_unknown_tid_fails() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("nojoin");
        let result = ts::with_current(p, 0, || kthread_join(Tid::NONE));
        assert_eq!(result, Err(ThreadError::NotFound));
    });
}

#[test]
fn wakeup_rouses_exactly_the_matching_sleepers() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("sleepers");
        let (q, _) = ts::stage_process("bystander");

        let key = Channel::of(p);
        let other = Channel::of(q);

        {
            let mut tg = p.threads[0].inner.lock();
            tg.state = ThreadState::Sleeping;
            tg.chan = Some(key);
        }
        {
            let mut tg = q.threads[0].inner.lock();
            tg.state = ThreadState::Sleeping;
            tg.chan = Some(other);
        }

        wakeup(key);

        assert_eq!(p.threads[0].inner.lock().state, ThreadState::Runnable);
        assert_eq!(
            q.threads[0].inner.lock().state,
            ThreadState::Sleeping,
            "different channel, not woken"
        );
    });
}

#[test]
fn wakeup_never_wakes_the_caller_itself() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("selfwake");
        let key = Channel::of(p);
        {
            let mut tg = p.threads[0].inner.lock();
            tg.state = ThreadState::Sleeping;
            tg.chan = Some(key);
        }

        // From the sleeping thread's own context, a wakeup on its channel
        // skips it; sleepers rely on the wakeup coming from elsewhere.
        ts::with_current(p, 0, || wakeup(key));
        assert_eq!(p.threads[0].inner.lock().state, ThreadState::Sleeping);

        wakeup(key);
        assert_eq!(p.threads[0].inner.lock().state, ThreadState::Runnable);
    });
}

#[test]
fn process_listing_logs_live_slots() {
    ts::run_isolated(|| {
        let (_, pid_a) = ts::stage_process("alpha");
        let (p, _) = ts::stage_process("beta");
        ts::make_zombie(p, 0);

        table::dump();

        let logs = ts::captured_logs();
        assert!(logs
            .iter()
            .any(|l| l.contains(&format!("pid {}", pid_a.as_u64())) && l.contains("alpha")));
        assert!(logs.iter().any(|l| l.contains("Zombie")));
    });
}
