use crate::components::ui::{
    Alert, AlertDescription, Button, ButtonSize, ButtonVariant, Card, CardContent,
    CardDescription, CardFooter, CardItem, CardList, Input, Label, ProgressBar, Spinner, Textarea,
    Toast, ToastViewport,
};
use crate::realtime::{self, EntryChanged};
use crate::state::session::prune_dismissed;
use crate::state::{AppContext, SessionHandle};
use crate::storage::{CookieStorage, UsernameStorage};
use icons::Check;
use leptos::prelude::*;
use tracing::{debug, warn};

#[component]
pub fn VotingPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let env = app_state.0.env.get_value();
    let handle = SessionHandle::open(&env, app_state.0.session_config);
    let snapshot = handle.snapshot;

    // Remote changes arrive one id at a time; a return to the tab reloads all.
    let channel = if env.is_local_demo() {
        None
    } else {
        match realtime::subscribe_channel(&env.channel_url(), move |changed: EntryChanged| {
            handle.with(|s| s.on_entry_changed(&changed.0));
        }) {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(error = %e, "change channel unavailable, relying on refresh");
                None
            }
        }
    };
    let channel = StoredValue::new_local(channel);
    let visible = realtime::on_visible(move || {
        handle.with(|s| s.on_became_visible());
    });

    handle.with(|s| s.refresh());

    on_cleanup(move || {
        visible.remove();
        channel.update_value(|c| {
            if let Some(c) = c.take() {
                c.close();
            }
        });
        handle.close();
    });

    let busy = Signal::derive(move || snapshot.with(|s| s.busy));
    let has_username = move || snapshot.with(|s| !s.username.is_empty());
    let dismissed: RwSignal<Vec<String>> = RwSignal::new(vec![]);
    Effect::new(move |_| {
        snapshot.with(|s| {
            let stale = dismissed.with_untracked(|ids| {
                let mut ids = ids.clone();
                prune_dismissed(&mut ids, &s.deletions).then_some(ids)
            });
            if let Some(ids) = stale {
                dismissed.set(ids);
            }
        });
    });

    let on_add = move |_: web_sys::MouseEvent| {
        if let Some(Err(e)) = handle.with(|s| s.add_entry()) {
            debug!(error = %e, "add ignored");
        }
    };

    view! {
        <ProgressBar active=busy />
        <main class="mx-auto flex w-full max-w-2xl flex-col gap-6 px-4 py-8">
            <header class="flex flex-col gap-2">
                <h1 class="text-xl font-semibold">"Vote"</h1>
                <UsernameField handle=handle />
            </header>

            <Show
                when=has_username
                fallback=|| view! {
                    <p class="text-sm text-muted-foreground">"Pick a name to see and add entries."</p>
                }
            >
                <CardList>
                    <For
                        each=move || snapshot.with(|s| s.entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>())
                        key=|id: &String| id.clone()
                        children=move |id| view! { <EntryCard id=id handle=handle /> }
                    />
                </CardList>

                <Button
                    class="self-start"
                    size=ButtonSize::Sm
                    attr:disabled=move || snapshot.with(|s| !s.can_add || s.busy)
                    on:click=on_add
                >
                    <Show when=move || busy.get()>
                        <Spinner />
                    </Show>
                    "+ Add"
                </Button>
            </Show>
        </main>

        <ToastViewport>
            {move || {
                snapshot
                    .with(|s| s.deletions.clone())
                    .into_iter()
                    .filter(|d| !dismissed.with(|ids| ids.contains(&d.id)))
                    .map(|d| {
                        let undo_id = d.id.clone();
                        let dismiss_id = d.id.clone();
                        view! {
                            <Toast
                                message=d.message
                                action_label="Undo"
                                on_action=Callback::new(move |_: ()| {
                                    if !handle.with(|s| s.undo(&undo_id)).unwrap_or(false) {
                                        debug!(id = %undo_id, "undo came too late");
                                    }
                                })
                                on_dismiss=Callback::new(move |_: ()| {
                                    dismissed.update(|ids| ids.push(dismiss_id.clone()));
                                })
                            />
                        }
                    })
                    .collect_view()
            }}
        </ToastViewport>
    }
}

#[component]
fn UsernameField(handle: SessionHandle) -> impl IntoView {
    let snapshot = handle.snapshot;
    let draft = Signal::derive(move || snapshot.with(|s| s.username_draft.clone()));
    let error = move || snapshot.with(|s| s.username_error.clone());

    view! {
        <div class="flex flex-col gap-2">
            <Label html_for="username" class="text-xs">"Your name"</Label>
            <Input
                id="username"
                placeholder="Name"
                value=draft
                invalid=Signal::derive(move || error().is_some())
                on_value=Callback::new(move |v: String| {
                    handle.with(|s| s.edit_username(&v));
                })
                on_blur=Callback::new(move |_: ()| {
                    handle.with(|s| s.flush_username());
                })
            />
            {move || {
                error()
                    .map(|e| {
                        view! {
                            <Alert class="border-destructive/30">
                                <AlertDescription class="text-destructive text-xs">{e}</AlertDescription>
                            </Alert>
                        }
                    })
            }}
        </div>
    }
}

#[component]
fn EntryCard(id: String, handle: SessionHandle) -> impl IntoView {
    let snapshot = handle.snapshot;
    let id = StoredValue::new(id);
    let entry = Memo::new(move |_| {
        snapshot.with(|s| id.with_value(|id| s.entries.iter().find(|e| &e.id == id).cloned()))
    });
    let busy = move || snapshot.with(|s| s.busy);
    let saved = move || !id.with_value(|id| id.is_empty());

    let text = Signal::derive(move || entry.with(|e| e.as_ref().map(|e| e.text.clone()).unwrap_or_default()));

    let on_text = Callback::new(move |v: String| {
        if let Some(Err(e)) = handle.with(|s| id.with_value(|id| s.edit_text(id, &v))) {
            debug!(error = %e, "edit ignored");
        }
    });
    let on_text_blur = Callback::new(move |_: ()| {
        handle.with(|s| id.with_value(|id| s.flush_text(id)));
    });

    let on_vote = move |_: web_sys::MouseEvent| {
        if let Some(Err(e)) = handle.with(|s| id.with_value(|id| s.toggle_vote(id))) {
            debug!(error = %e, "vote ignored");
        }
    };
    let on_delete = move |_: web_sys::MouseEvent| {
        if let Some(Err(e)) = handle.with(|s| id.with_value(|id| s.soft_delete(id))) {
            debug!(error = %e, "delete ignored");
        }
    };

    view! {
        <CardItem>
            <Card>
                <CardContent>
                    <Textarea placeholder="Write something" value=text on_value=on_text on_blur=on_text_blur />
                </CardContent>
                <CardFooter>
                    <CardDescription>
                        {move || {
                            entry
                                .with(|e| {
                                    e.as_ref()
                                        .map(|e| {
                                            let mut label = format!("by {}", e.created_by.username);
                                            if let Some(editor) = e.edited_by_other() {
                                                label.push_str(&format!(", edited by {}", editor.username));
                                            }
                                            label
                                        })
                                })
                                .unwrap_or_default()
                        }}
                    </CardDescription>
                    <div class="flex items-center gap-2">
                        {move || {
                            let (votes, voted) = snapshot.with(|s| {
                                entry.with(|e| {
                                    e.as_ref()
                                        .map(|e| (e.voters.len(), e.has_voter(&s.username)))
                                        .unwrap_or((0, false))
                                })
                            });
                            let variant = if voted { ButtonVariant::Default } else { ButtonVariant::Outline };
                            let title = if voted { "Retract vote" } else { "Vote" };
                            view! {
                                <Button
                                    variant=variant
                                    size=ButtonSize::Sm
                                    attr:title=title
                                    attr:disabled=move || busy() || !saved()
                                    on:click=on_vote
                                >
                                    <Check />
                                    {votes}
                                </Button>
                            }
                        }}
                        <Button
                            variant=ButtonVariant::Ghost
                            size=ButtonSize::Sm
                            class="text-destructive"
                            attr:title="Delete"
                            attr:disabled=move || busy() || !saved()
                            on:click=on_delete
                        >
                            "Delete"
                        </Button>
                    </div>
                </CardFooter>
            </Card>
        </CardItem>
    }
}

#[component]
pub fn ClearCookiesPage() -> impl IntoView {
    let cleared = CookieStorage.clear();

    view! {
        <main class="mx-auto flex w-full max-w-md flex-col gap-4 px-4 py-8">
            <Alert>
                <AlertDescription class="text-xs">
                    {if cleared { "Cookie cleared." } else { "Haven't found a cookie to clear." }}
                </AlertDescription>
            </Alert>
            <Button variant=ButtonVariant::Link href="/">"Back to the list"</Button>
        </main>
    }
}
