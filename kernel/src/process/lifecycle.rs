//! Process lifecycle: fork, exit, wait.

use core::ptr;

use crate::memory::AddressSpace;
use crate::per_cpu;
use crate::process::table::{self, ProcessError};
use crate::process::{Pid, ProcState};
use crate::task::scheduler::sched;
use crate::task::sleep::{sleep, wakeup, Channel};
use crate::task::thread::ThreadState;

/// Create a child process that is a copy of the caller: same address
/// space contents, duplicated open-file handles and working directory,
/// inherited signal dispositions and mask (but no pending signals), and
/// a first thread that resumes exactly where the caller's thread is,
/// except the return-value register reads zero.
pub fn fork() -> Result<Pid, ProcessError> {
    let (p, t) = per_cpu::my_thread().expect("fork: no running thread");

    // Snapshot what the child inherits before taking the child's lock,
    // so no two process locks are ever held together.
    let inherited = {
        let guard = p.inner.lock();
        guard.signals.inherited()
    };
    let trap_idx = t.inner.lock().trap_index;

    let (np, mut ng) = table::alloc_process()?;

    let pd = p.data();
    let nd = np.data_mut();

    {
        let src = pd.addr_space.as_ref().expect("fork: no address space");
        let dst = nd
            .addr_space
            .as_mut()
            .expect("fork: fresh process without address space");
        if AddressSpace::clone_into(src.as_ref(), dst.as_mut()).is_err() {
            table::free_process(np, &mut ng);
            return Err(ProcessError::OutOfMemory);
        }
    }

    // The child's first thread picks up from the caller's trap frame.
    {
        let src = *pd
            .trap_frames
            .as_ref()
            .expect("fork: no trap frames")
            .frame(trap_idx);
        let frames = nd
            .trap_frames
            .as_mut()
            .expect("fork: fresh process without trap frames");
        let frame = frames.frame_mut(0);
        *frame = src;
        frame.a0 = 0; // fork returns 0 in the child
    }

    nd.files = pd.files.duplicate();
    nd.cwd = pd.cwd.clone();
    nd.name = pd.name.clone();

    ng.signals = inherited;
    let child_pid = ng.pid;
    drop(ng);

    {
        let mut tree = table::tree().lock();
        tree[table::index_of(np)] = Some(table::index_of(p));
    }

    {
        let mut tg = np.threads[0].inner.lock();
        tg.state = ThreadState::Runnable;
    }

    log::info!(
        "fork: pid {} spawned child {}",
        p.pid().as_u64(),
        child_pid.as_u64()
    );
    Ok(child_pid)
}

/// Terminate the calling process. Every sibling thread is forced out of
/// any sleep, joined, and reaped; open files and the working directory
/// are released; children are handed to init; then the process turns
/// Zombie and the thread switches away for the last time. The zombie
/// lingers until the parent collects it with `wait`.
pub fn exit(status: i32) -> ! {
    let (p, t) = per_cpu::my_thread().expect("exit: no running thread");
    if let Some(init) = table::init_process() {
        if ptr::eq(p, init) {
            panic!("init exiting");
        }
    }

    // Force every sibling out of sleep with the kill flag set; their own
    // exit paths notice it and unwind.
    {
        let _guard = p.inner.lock();
        for other in p.threads.iter() {
            if ptr::eq(other, t) {
                continue;
            }
            let mut tg = other.inner.lock();
            if tg.state != ThreadState::Unused && tg.state != ThreadState::Zombie {
                tg.killed = true;
                if tg.state == ThreadState::Sleeping {
                    tg.state = ThreadState::Runnable;
                }
            }
        }
    }

    // Join each sibling so no thread still runs in this address space
    // when the process goes Zombie.
    for other in p.threads.iter() {
        if ptr::eq(other, t) {
            continue;
        }
        let mut tg = other.inner.lock();
        while tg.state != ThreadState::Unused && tg.state != ThreadState::Zombie {
            tg = sleep(Channel::of(other), tg);
        }
        if tg.state == ThreadState::Zombie {
            other.free(&mut tg);
        }
    }

    {
        let data = p.data_mut();
        data.files.close_all();
        data.cwd = None;
    }

    let mut tree = table::tree().lock();
    let my_idx = table::index_of(p);

    // Hand children to init, which reaps forever.
    let mut orphaned = false;
    if let Some(init_idx) = table::init_index() {
        for slot in tree.iter_mut() {
            if *slot == Some(my_idx) {
                *slot = Some(init_idx);
                orphaned = true;
            }
        }
    }
    if orphaned {
        wakeup(Channel::of(table::init_process().expect("init process missing")));
    }

    // The parent may be sleeping in wait.
    if let Some(parent_idx) = tree[my_idx] {
        wakeup(Channel::of(table::by_index(parent_idx)));
    }

    {
        let mut guard = p.inner.lock();
        guard.xstate = status;
        guard.state = ProcState::Zombie;
        log::info!("exit: pid {} status {}", guard.pid.as_u64(), status);
    }

    // Keep the tree locked until our thread lock is held, so the parent
    // cannot reap the slot out from under a still-running thread.
    let mut tg = t.inner.lock();
    tg.state = ThreadState::Zombie;
    drop(tree);

    let _tg = sched(tg, t.context_ptr());
    panic!("zombie exit");
}

/// Wait for any child to exit; returns its pid and exit status, and
/// frees the child's slot. Blocks until a child turns Zombie. Fails if
/// the caller has no children at all, or has itself been killed.
pub fn wait() -> Result<(Pid, i32), ProcessError> {
    let p = per_cpu::my_proc().expect("wait: no running process");
    let my_idx = table::index_of(p);
    let my_pid = p.pid();

    let mut tree = table::tree().lock();
    loop {
        let mut have_kids = false;
        for (i, np) in table::pool().iter().enumerate() {
            if tree[i] != Some(my_idx) {
                continue;
            }
            have_kids = true;
            // The lock also makes sure the child is fully off its stack
            // before the slot is recycled.
            let mut guard = np.inner.lock();
            if guard.state == ProcState::Zombie {
                let pid = guard.pid;
                let status = guard.xstate;
                tree[i] = None;
                table::free_process(np, &mut guard);
                log::debug!("wait: pid {} reaped child {}", my_pid.as_u64(), pid.as_u64());
                return Ok((pid, status));
            }
        }

        if !have_kids || p.killed() {
            return Err(ProcessError::NoChildren);
        }

        // Exiting children poke our slot's channel.
        tree = sleep(Channel::of(p), tree);
    }
}
