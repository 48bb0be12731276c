// Shared backend output fixtures.
#![allow(dead_code)]

use unison_drive::{Engine, Update};

pub const STARTUP: &[&str] = &[
    "Unison 2.51.3 (ocaml 4.11.1): Contacting server...\n",
    "Looking for changes\n",
    "Reconciling changes\n",
    "\nleft           right              \n",
];

pub const FIRST_PROMPT: &str = "changed  ---->            one  [f] ";

/// Listing of a three-item plan, as printed after `l`, ending in the prompt.
pub const LISTING: &str = "\n\
changed  ---->            file1  \n\
left           : changed file       modified on 2021-02-07 at 16:48:46  size 1146      rw-r--r--\n\
right          : unchanged file     modified on 2021-02-07 at 16:40:02  size 1020      rw-r--r--\n\
         <----  new file  dir/file2  \n\
left           : absent\n\
right          : new file           modified on 2021-02-07 at 16:50:00  size 12        rw-r--r--\n\
changed  <-?->  changed   dir/file3  \n\
left           : changed file       modified on 2021-02-07 at 16:48:46  size 10        rw-r--r--\n\
right          : changed file       modified on 2021-02-07 at 16:49:01  size 11        rw-r--r--\n\
changed  ---->            file1  [f] ";

pub fn prompt_for(row: &str) -> String {
    format!("{}  [f] ", row)
}

pub const ROW1: &str = "changed  ---->            file1";
pub const ROW2: &str = "         <----  new file  dir/file2";
pub const ROW3: &str = "changed  <-?->  changed   dir/file3";

pub const DIFF_BLOCK: &str = "\n\
diff -u '/home/me/left/dir/file3' '/home/me/right/dir/file3'\n\
--- /home/me/left/dir/file3\n\
+++ /home/me/right/dir/file3\n\
@@ -1 +1 @@\n\
-hello left\n\
+hello right\n\
\n";

pub const PROCEED: &str = "\nProceed with propagating updates? [] ";

pub const AFTER_PROCEED: &[&str] = &[
    "\nPropagating updates\n",
    "\nUNISON 2.51.3 (OCAML 4.11.1) started propagating changes at 16:49:10.62 on 07 Feb 2021\n",
    "[BGN] Updating file file1 from /home/me/left to /home/me/right\n",
    "  8%  07:45 ETA",
    "\r                \r",
    "[END] Updating file file1\n",
    "[BGN] Copying dir/file2 from /home/me/right to /home/me/left\n",
    "[END] Copying dir/file2\n",
    "UNISON 2.51.3 (OCAML 4.11.1) finished propagating changes at 16:49:11.05 on 07 Feb 2021\n",
    "Saving synchronizer state\n",
    "Synchronization complete at 16:49:11  (2 items transferred, 1 skipped, 0 failed)\n",
];

pub const EMPTIED_WARNING: &str = "\n\
The root of one of the replicas has been completely emptied.\n\
Unison may delete everything in the other replica.  (Set the \n\
'confirmbigdeletes' preference to false to disable this check.)\n\
\n\
Do you really want to proceed? [] ";

pub const USAGE_BANNER: &str = "Usage: unison [options]\n    \
or unison root1 root2 [options]\n    \
or unison profilename [options]\n\
\n\
For a list of options, type \"unison -help\".\n\
For a tutorial on basic usage, type \"unison -doc tutorial\".\n\
For other documentation, type \"unison -doc topics\".\n\
\n\
Profile /home/me/.unison/nosuch.prf does not exist\n";

/// Feed every chunk and merge the updates.
pub fn feed(engine: &mut Engine, chunks: &[&str]) -> Update {
    let mut total = Update::new();
    for chunk in chunks {
        total.merge(engine.proc_output(chunk.as_bytes()));
    }
    total
}

/// An engine that has listed the three-item plan and is ready.
pub fn ready_engine() -> Engine {
    let mut engine = Engine::new();
    engine.proc_start();
    feed(&mut engine, STARTUP);
    let update = engine.proc_output(prompt_for(ROW1).as_bytes());
    assert_eq!(update.input, b"l");
    let update = engine.proc_output(LISTING.as_bytes());
    assert!(update.plan_ready);
    engine
}
